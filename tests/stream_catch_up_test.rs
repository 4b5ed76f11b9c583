mod common;

use riptide::{subscribe_to_stream, EventNumber, Inbound, Outbound, SubscriptionSettings};

use common::{event, next_delivery, num, remote_log, stream_page};

#[tokio::test]
async fn history_then_live_handoff_delivers_gapless_sequence() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_stream(
        connection,
        inbound,
        "orders-1",
        None,
        SubscriptionSettings::default(),
    );

    // History is paged forward, one read in flight at a time.
    match log.next_request().await {
        Outbound::ReadStream { stream, from, .. } => {
            assert_eq!(stream.as_str(), "orders-1");
            assert_eq!(from, EventNumber::FIRST);
        }
        other => panic!("expected a stream read, got {:?}", other),
    }
    log.send(stream_page(&[0, 1], 2, false));

    match log.next_request().await {
        Outbound::ReadStream { from, .. } => assert_eq!(from, num(2)),
        other => panic!("expected a stream read, got {:?}", other),
    }
    log.send(stream_page(&[2], 3, true));

    // End of stream: the engine opens the push channel.
    assert!(matches!(
        log.next_request().await,
        Outbound::SubscribeToStream { .. }
    ));
    log.send(Inbound::SubscribeCompleted {
        last_position: num(4),
    });

    // The server was ahead at subscribe time, so catch-up reading resumes
    // while fresh pushes are stashed.
    assert!(matches!(
        log.next_request().await,
        Outbound::ReadStream { from, .. } if from == num(3)
    ));
    log.send(Inbound::EventAppeared(event(4)));
    log.send(Inbound::EventAppeared(event(5)));
    log.send(stream_page(&[3, 4], 5, false));

    assert!(matches!(
        log.next_request().await,
        Outbound::ReadStream { from, .. } if from == num(5)
    ));
    log.send(stream_page(&[], 5, false));

    // Live now; the stashed 5 came through the same filter, so a resend of
    // it is dropped and 6 flows normally.
    log.send(Inbound::EventAppeared(event(5)));
    log.send(Inbound::EventAppeared(event(6)));

    let mut seen = Vec::new();
    for _ in 0..=6 {
        let event = next_delivery(&mut sub).await.expect("stream open").unwrap();
        seen.push(event.original_number().as_raw());
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6]);

    let increasing = seen.windows(2).all(|w| w[0] < w[1]);
    assert!(increasing, "positions must strictly increase: {:?}", seen);
    assert_eq!(sub.last_delivered(), Some(num(6)));
    assert!(sub.is_live());
}

#[tokio::test]
async fn exclusive_start_skips_the_boundary_event() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_stream(
        connection,
        inbound,
        "orders-1",
        Some(num(2)),
        SubscriptionSettings::default(),
    );

    assert!(matches!(
        log.next_request().await,
        Outbound::ReadStream { from, .. } if from == num(2)
    ));
    // The page overlaps the starting point; 2 itself must not be delivered.
    log.send(stream_page(&[2, 3, 4], 5, true));

    assert!(matches!(
        log.next_request().await,
        Outbound::SubscribeToStream { .. }
    ));

    let first = next_delivery(&mut sub).await.unwrap().unwrap();
    assert_eq!(first.original_number(), num(3));
    let second = next_delivery(&mut sub).await.unwrap().unwrap();
    assert_eq!(second.original_number(), num(4));
}

#[tokio::test]
async fn absent_stream_is_an_empty_history() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_stream(
        connection,
        inbound,
        "orders-1",
        None,
        SubscriptionSettings::default(),
    );

    let _ = log.next_request().await;
    log.send(Inbound::Failed(riptide::Error::StreamNotFound {
        stream: "orders-1".to_string(),
    }));

    // Not-found is absorbed: the engine subscribes and waits for the stream
    // to come into existence.
    assert!(matches!(
        log.next_request().await,
        Outbound::SubscribeToStream { .. }
    ));
    log.send(Inbound::SubscribeCompleted {
        last_position: num(0),
    });

    // Confirmation lands ahead of the (empty) history, so one catch-up read
    // goes out; the stream still does not exist, which is absorbed again.
    assert!(matches!(
        log.next_request().await,
        Outbound::ReadStream { .. }
    ));
    log.send(Inbound::Failed(riptide::Error::StreamNotFound {
        stream: "orders-1".to_string(),
    }));

    log.send(Inbound::EventAppeared(event(0)));
    let first = next_delivery(&mut sub).await.unwrap().unwrap();
    assert_eq!(first.original_number(), num(0));
}

#[tokio::test]
async fn finite_mode_completes_without_subscribing() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_stream(
        connection,
        inbound,
        "orders-1",
        None,
        SubscriptionSettings {
            follow: false,
            ..SubscriptionSettings::default()
        },
    );

    let _ = log.next_request().await;
    log.send(stream_page(&[0, 1], 2, false));
    let _ = log.next_request().await;
    log.send(stream_page(&[2], 3, true));

    let mut seen = Vec::new();
    while let Some(result) = next_delivery(&mut sub).await {
        seen.push(result.unwrap().original_number().as_raw());
    }
    assert_eq!(seen, vec![0, 1, 2]);
    assert!(sub.is_stopped());

    // No SubscribeTo may ever have been issued.
    log.expect_no_request().await;
}

#[tokio::test]
async fn projected_streams_order_by_link() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_stream(
        connection,
        inbound,
        "$orders-by-day",
        None,
        SubscriptionSettings {
            resolve_link_tos: true,
            ..SubscriptionSettings::default()
        },
    );

    assert!(matches!(
        log.next_request().await,
        Outbound::ReadStream { resolve_link_tos: true, .. }
    ));

    // Targets live in unrelated streams with unrelated numbers; delivery
    // order and the resume position follow the links.
    log.send(Inbound::ReadCompleted {
        events: vec![
            common::linked_event(0, "orders-9", 4),
            common::linked_event(1, "orders-3", 0),
        ],
        next: num(2),
        end_of_stream: true,
    });

    let first = next_delivery(&mut sub).await.unwrap().unwrap();
    assert!(first.is_resolved());
    assert_eq!(first.original_number(), num(0));
    assert_eq!(first.event.stream_id.as_str(), "orders-9");

    let second = next_delivery(&mut sub).await.unwrap().unwrap();
    assert_eq!(second.original_number(), num(1));

    assert_eq!(sub.last_delivered(), Some(num(1)));
}
