use serde_json::json;
use spark_roundabout::{ModeDescriptor, Payload, Roundabout, RoundaboutConfig, stage};

use super::support::{RecordingStage, drain, init_tracing};

fn objects(values: &[i64]) -> Vec<Payload> {
    values.iter().map(|value| Payload::object(json!(value))).collect()
}

/// 数据已流入 `output` 后再挂载：旧数据保持原位，只有新数据经过新 Stage。
#[test]
fn attach_after_flow_only_routes_new_data() {
    init_tracing();
    let mut roundabout = Roundabout::default();
    roundabout.write("a").expect("写入应成功");

    let stage = RecordingStage::new("late");
    let seen = stage.seen();
    roundabout.attach(stage).expect("运行期挂载应成功");
    roundabout.write("b").expect("写入应成功");
    roundabout.end().expect("结束应成功");

    let (items, ended) = drain(&mut roundabout);
    assert_eq!(items, vec![Payload::from("ab")], "读取顺序与写入顺序一致");
    assert!(ended);
    assert_eq!(
        seen.lock().expect("recording lock").as_slice(),
        [Payload::from("b")],
        "拼接前已进入 output 的数据不会回流到新 Stage"
    );
}

/// 背压期间拼接：排队在 `input` 与写队列中的数据全部经过新 Stage，且不丢失、不乱序。
#[test]
fn splice_under_backpressure_preserves_queued_data() {
    init_tracing();
    let tight = ModeDescriptor::new(true, 1);
    let mut roundabout = Roundabout::new(RoundaboutConfig::from(tight));
    assert!(roundabout.write(json!(1)).expect("写入应成功"));
    assert!(roundabout.write(json!(2)).expect("写入应成功"));
    assert!(
        !roundabout.write(json!(3)).expect("写入应成功"),
        "output 与 input 均已满时应返回背压提示"
    );

    let stage = RecordingStage::new("spliced").with_mode(tight);
    let seen = stage.seen();
    roundabout.attach(stage).expect("背压期间挂载应成功");
    roundabout.end().expect("结束应成功");

    let (items, ended) = drain(&mut roundabout);
    assert_eq!(items, objects(&[1, 2, 3]));
    assert!(ended);
    assert_eq!(
        seen.lock().expect("recording lock").as_slice(),
        objects(&[2, 3]).as_slice()
    );
}

/// 读写交替进行时多次拼接，每个 Stage 只看到挂载之后进入链路的数据。
#[test]
fn repeated_splices_while_reading() {
    init_tracing();
    let mode = ModeDescriptor::objects();
    let mut roundabout = Roundabout::new(RoundaboutConfig::from(mode));
    let mut collected = Vec::new();
    let mut recorders = Vec::new();

    for round in 0..3_i64 {
        let stage = RecordingStage::new(&format!("stage-{round}")).with_mode(mode);
        recorders.push(stage.seen());
        roundabout.attach(stage).expect("挂载应成功");
        roundabout.write(json!(round)).expect("写入应成功");
        collected.extend(drain(&mut roundabout).0);
    }
    roundabout.end().expect("结束应成功");
    let (rest, ended) = drain(&mut roundabout);
    collected.extend(rest);

    assert!(ended);
    assert_eq!(collected, objects(&[0, 1, 2]));
    assert_eq!(
        recorders[0].lock().expect("recording lock").as_slice(),
        objects(&[0, 1, 2]).as_slice()
    );
    assert_eq!(
        recorders[2].lock().expect("recording lock").as_slice(),
        objects(&[2]).as_slice()
    );
}

#[test]
fn registry_tracks_splices() {
    init_tracing();
    let mut roundabout = Roundabout::default();
    assert_eq!(roundabout.epoch(), 0);
    assert!(roundabout.stages().is_empty());

    roundabout
        .attach(stage::identity("decode"))
        .expect("挂载应成功")
        .attach(stage::identity("route").with_readable_mode(ModeDescriptor::objects()))
        .expect("挂载应成功");

    let stages = roundabout.stages();
    assert_eq!(roundabout.epoch(), 2);
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0].label(), "decode");
    assert_eq!(stages[0].position(), 0);
    assert_eq!(stages[1].label(), "route");
    assert_eq!(stages[1].readable_mode(), ModeDescriptor::objects());
    assert_eq!(stages[1].writable_mode(), ModeDescriptor::bytes());
}
