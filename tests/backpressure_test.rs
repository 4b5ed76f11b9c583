mod common;

use riptide::{subscribe_to_all, Error, Inbound, Outbound, SubscriptionSettings};

use common::{all_page, event, expect_no_delivery, next_delivery, pos, remote_log};

#[tokio::test]
async fn deliveries_never_exceed_requested_demand() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_all(connection, inbound, None, SubscriptionSettings::default())
        .with_prefetch(0);

    let _ = log.next_request().await;
    log.send(all_page(&[0, 1, 2, 3, 4], 5, true));
    let _ = log.next_request().await; // SubscribeToAll

    // Five events are buffered; with no demand, none may move.
    expect_no_delivery(&mut sub).await;

    sub.request(2);
    let first = next_delivery(&mut sub).await.unwrap().unwrap();
    let second = next_delivery(&mut sub).await.unwrap().unwrap();
    assert_eq!(first.original_position(), pos(0));
    assert_eq!(second.original_position(), pos(1));

    // Demand exhausted again; the rest stays put.
    expect_no_delivery(&mut sub).await;

    sub.request(3);
    for n in [2, 3, 4] {
        let event = next_delivery(&mut sub).await.unwrap().unwrap();
        assert_eq!(event.original_position(), pos(n));
    }
}

#[tokio::test]
async fn demand_accumulates_across_requests() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_all(connection, inbound, None, SubscriptionSettings::default())
        .with_prefetch(0);

    // Demand signalled before any events exist is not lost.
    sub.request(1);
    sub.request(2);

    let _ = log.next_request().await;
    log.send(all_page(&[0, 1, 2, 3], 4, true));
    let _ = log.next_request().await;

    for n in [0, 1, 2] {
        let event = next_delivery(&mut sub).await.unwrap().unwrap();
        assert_eq!(event.original_position(), pos(n));
    }
    expect_no_delivery(&mut sub).await;
}

#[tokio::test]
async fn saturated_consumer_pauses_historical_reading() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_all(
        connection,
        inbound,
        None,
        SubscriptionSettings {
            max_buffered: 2,
            ..SubscriptionSettings::default()
        },
    )
    .with_prefetch(0);

    let _ = log.next_request().await;
    // A full buffer with zero demand: the engine must not fetch more.
    log.send(all_page(&[0, 1], 2, false));
    log.expect_no_request().await;

    // Returning demand drains what was buffered; the paused subscription
    // then finishes cleanly, and the caller resumes from last_delivered().
    sub.request(10);
    let mut seen = Vec::new();
    while let Some(result) = next_delivery(&mut sub).await {
        seen.push(result.unwrap().original_position().commit());
    }
    assert_eq!(seen, vec![0, 1]);
    assert_eq!(sub.last_delivered(), Some(pos(1)));
    assert!(sub.is_stopped());
}

#[tokio::test]
async fn saturated_live_consumer_unsubscribes_and_drains() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_all(
        connection,
        inbound,
        None,
        SubscriptionSettings {
            max_buffered: 2,
            ..SubscriptionSettings::default()
        },
    )
    .with_prefetch(0);

    let _ = log.next_request().await;
    log.send(all_page(&[], 0, true));
    let _ = log.next_request().await;
    log.send(Inbound::SubscribeCompleted {
        last_position: pos(0),
    });
    let _ = log.next_request().await; // catch-up read
    log.send(all_page(&[], 0, false));

    // Two pushes fill the buffer; the engine politely backs out.
    log.send(Inbound::EventAppeared(event(1)));
    log.send(Inbound::EventAppeared(event(2)));
    assert!(matches!(
        log.next_request().await,
        Outbound::Unsubscribe { .. }
    ));

    // Anything pushed after that is absorbed, and the server's
    // acknowledgement does not end the drain early.
    log.send(Inbound::EventAppeared(event(3)));
    log.send(Inbound::Unsubscribed);

    sub.request(10);
    let mut seen = Vec::new();
    while let Some(result) = next_delivery(&mut sub).await {
        seen.push(result.unwrap().original_position().commit());
    }
    assert_eq!(seen, vec![1, 2]);
    assert!(sub.is_stopped());
}

#[tokio::test]
async fn catch_up_stash_overrun_fails_the_subscription() {
    let (connection, inbound, mut log) = remote_log();
    let mut sub = subscribe_to_all(
        connection,
        inbound,
        None,
        SubscriptionSettings {
            max_buffered: 2,
            ..SubscriptionSettings::default()
        },
    );

    let _ = log.next_request().await;
    log.send(all_page(&[], 0, true));
    let _ = log.next_request().await;
    log.send(Inbound::SubscribeCompleted {
        last_position: pos(9),
    });
    let _ = log.next_request().await; // catch-up read, left unanswered

    // The live side outruns the stash bound while the read is in flight.
    log.send(Inbound::EventAppeared(event(1)));
    log.send(Inbound::EventAppeared(event(2)));
    log.send(Inbound::EventAppeared(event(3)));

    let failure = next_delivery(&mut sub).await.expect("an error delivery");
    assert_eq!(failure, Err(Error::SubscriptionOverrun { buffered: 2 }));
    assert!(next_delivery(&mut sub).await.is_none(), "error is terminal");
}
