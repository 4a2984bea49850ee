use std::{
    error::Error as _,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use futures::{
    SinkExt, Stream, StreamExt,
    executor::block_on,
    task::{ArcWake, waker},
};
use serde_json::json;
use spark_roundabout::{
    ModeDescriptor, Payload, ReadOutcome, Roundabout, RoundaboutConfig, RoundaboutError,
    WriteCompletion, stage,
};

use super::support::drain;

/// 统计被唤醒次数的 waker。
struct CountingWaker(AtomicUsize);

impl ArcWake for CountingWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn write_after_end_fails_synchronously() {
    let mut roundabout = Roundabout::default();
    roundabout.end().expect("结束应成功");

    let error = roundabout.write("late").expect_err("结束后写入必须失败");
    assert_eq!(error.code(), "roundabout.write_after_end");
    assert!(error.is_protocol_violation());
    assert_eq!(
        roundabout.try_read().expect("读取应成功"),
        ReadOutcome::End,
        "失败的写入不会影响读方向"
    );
}

#[test]
fn sink_rejects_send_after_close() {
    block_on(async {
        let mut roundabout = Roundabout::default();
        roundabout.close().await.expect("关闭应成功");
        let error = roundabout
            .send(Payload::from("late"))
            .await
            .expect_err("关闭后发送必须失败");
        assert_eq!(error.code(), "roundabout.write_after_end");
    });
}

#[test]
fn destroyed_roundabout_rejects_every_operation() {
    let mut roundabout = Roundabout::default();
    roundabout.write("queued").expect("写入应成功");
    roundabout.destroy();
    roundabout.destroy();

    assert!(roundabout.is_destroyed());
    assert_eq!(
        roundabout.write("more").expect_err("销毁后写入必须失败").code(),
        "roundabout.destroyed"
    );
    assert_eq!(
        roundabout
            .attach(stage::identity("late"))
            .expect_err("销毁后挂载必须失败")
            .code(),
        "roundabout.destroyed"
    );
    assert!(matches!(
        roundabout.try_read(),
        Err(RoundaboutError::Destroyed)
    ));
    assert!(matches!(roundabout.end(), Err(RoundaboutError::Destroyed)));
    assert!(block_on(roundabout.next()).is_none(), "销毁后流立即终止");
}

#[test]
fn destroy_wakes_pending_reader_once() {
    let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
    let waker = waker(Arc::clone(&counter));
    let mut cx = Context::from_waker(&waker);

    let mut roundabout = Roundabout::default();
    assert!(Pin::new(&mut roundabout).poll_next(&mut cx).is_pending());
    roundabout.destroy();
    roundabout.destroy();

    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert!(matches!(
        Pin::new(&mut roundabout).poll_next(&mut cx),
        Poll::Ready(None)
    ));
}

#[test]
fn attach_after_output_ended_is_sealed() {
    let mut roundabout = Roundabout::default();
    roundabout.end().expect("结束应成功");
    assert!(roundabout.is_finished());

    let error = roundabout
        .attach(stage::identity("too-late"))
        .expect_err("output 结束后不可拼接");
    assert!(matches!(&error, RoundaboutError::Sealed { label } if label == "too-late"));
    assert!(roundabout.stages().is_empty());
    assert_eq!(roundabout.epoch(), 0);
}

#[test]
fn object_written_to_byte_side_is_invalid() {
    let mut roundabout = Roundabout::default();
    let error = roundabout
        .write(json!({"hello": "universe"}))
        .expect_err("字节模式不接受对象");
    match error {
        RoundaboutError::InvalidChunk {
            endpoint,
            expected,
            received,
        } => {
            assert_eq!(endpoint, "writable");
            assert_eq!(expected, "bytes");
            assert_eq!(received, "object");
        }
        other => panic!("意外的错误：{other:?}"),
    }
    roundabout.write("still open").expect("拒绝单个数据块不影响后续写入");
}

/// Stage 失败在提交写入之后发生：写入本身成功，错误由下一次调用报告一次，之后链路继续工作。
#[test]
fn stage_failure_surfaces_with_label_and_source() {
    let mut roundabout = Roundabout::default();
    roundabout
        .attach(stage::from_fn("exploder", |payload, out| {
            if payload.as_bytes().is_some_and(|bytes| &bytes[..] == b"boom") {
                return Err("refusing to forward boom".into());
            }
            out.push(payload);
            Ok(())
        }))
        .expect("挂载应成功");

    roundabout.write("fine").expect("普通数据应成功");
    roundabout.write("boom").expect("写入已被接收，失败发生在其后的驱动中");
    let error = roundabout
        .write("rejected")
        .expect_err("暂存的 Stage 错误应由下一次调用报告");
    assert_eq!(error.code(), "roundabout.stage");
    assert!(!error.is_protocol_violation());
    assert!(matches!(&error, RoundaboutError::Stage { label, .. } if label == "exploder"));
    assert_eq!(
        error.source().map(ToString::to_string).as_deref(),
        Some("refusing to forward boom")
    );

    roundabout.write("recovered").expect("错误只报告一次");
    roundabout.end().expect("结束应成功");
    let mut received = Vec::new();
    while let ReadOutcome::Data(payload) = roundabout.try_read().expect("读取应成功") {
        received.push(payload);
    }
    assert_eq!(
        received,
        vec![Payload::from("finerecovered")],
        "报告错误时被拒绝的写入不进入管道"
    );
    assert!(roundabout.is_finished());
}

/// 拼接后的首次驱动失败不影响拼接本身：`attach` 返回 `Ok`，Stage 留在链路中。
#[test]
fn splice_is_committed_even_when_its_first_drive_fails() {
    let tight = ModeDescriptor::new(true, 1);
    let mut roundabout = Roundabout::new(RoundaboutConfig::from(tight));
    roundabout.write(json!(1)).expect("写入应成功");
    roundabout.write(json!(2)).expect("写入应成功");

    let picky = stage::from_fn("picky", |payload, out| {
        if payload.as_object() == Some(&json!(2)) {
            return Err("two is not welcome".into());
        }
        out.push(payload);
        Ok(())
    })
    .with_mode(tight);
    roundabout.attach(picky).expect("拼接已经提交，不应报告驱动错误");
    assert_eq!(roundabout.stages().len(), 1);
    assert_eq!(roundabout.epoch(), 1);

    let error = roundabout.write(json!(3)).expect_err("下一次调用报告暂存的错误");
    assert!(matches!(&error, RoundaboutError::Stage { label, .. } if label == "picky"));

    roundabout.write(json!(4)).expect("写入应成功");
    roundabout.end().expect("结束应成功");
    let (items, ended) = drain(&mut roundabout);
    assert_eq!(items, vec![Payload::from(json!(1)), Payload::from(json!(4))]);
    assert!(ended);
}

/// 新 Stage 拒收已排队的对象时，数据停留在原处：先交付已在 `output` 中的数据，再报告错误，且不会静默挂起。
#[test]
fn chunks_rejected_after_a_splice_stay_queued() {
    let tight = ModeDescriptor::new(true, 1);
    let mut roundabout = Roundabout::new(RoundaboutConfig::from(tight));
    for value in 1..=3 {
        roundabout.write(json!(value)).expect("写入应成功");
    }

    roundabout
        .attach(stage::identity("bytes-stage"))
        .expect("拼接已经提交，不应报告驱动错误");
    assert_eq!(roundabout.stages().len(), 1);

    assert_eq!(
        roundabout.try_read().expect("已在 output 中的数据先交付"),
        ReadOutcome::Data(Payload::from(json!(1)))
    );
    let error = roundabout.try_read().expect_err("无数据可读时报告暂存的错误");
    assert_eq!(error.code(), "roundabout.invalid_chunk");
    let error = roundabout
        .try_read()
        .expect_err("被拒收的对象仍在队列中，再次驱动得到同样的错误");
    assert_eq!(error.code(), "roundabout.invalid_chunk");

    roundabout.end().expect("结束应成功");
    assert_eq!(
        roundabout.write_state(),
        WriteCompletion::WriterEnded,
        "被拒收的对象没有丢失，写队列因此无法排空"
    );
    assert!(!roundabout.is_finished());
}
