mod common;

use campus_events::{
    enrolment::{ledger, orchestrator, permission::EligibilityDescriptor, projector},
    error::CampusError,
};
use common::World;
use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_oversell() {
    const SEATS: i32 = 7;
    const RACERS: u32 = 40;

    let world = World::new().await;
    let event = world.event(SEATS, EligibilityDescriptor::allow_everyone()).await;
    let students = world.students(RACERS).await;

    let handles = students.into_iter().map(|student| {
        let db = world.db.clone();
        tokio::spawn(async move { ledger::join(&db, event, student).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("join task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let no_space = results
        .iter()
        .filter(|r| matches!(r, Err(CampusError::NoFreeSpace { .. })))
        .count();

    assert_eq!(successes, SEATS as usize);
    assert_eq!(no_space, RACERS as usize - SEATS as usize);
    assert_eq!(world.free_space(event).await, 0);
    assert_eq!(world.enrolled(event).await, i64::from(SEATS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orchestrated_joins_never_oversell() {
    let world = World::new().await;
    let event = world.event(3, EligibilityDescriptor::allow_everyone()).await;
    let students = world.students(25).await;

    let handles = students.into_iter().map(|student| {
        let db = world.db.clone();
        tokio::spawn(async move { orchestrator::join_event(&db, event, student).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("join task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    //losers either fail fast or lose under the lock
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(CampusError::EventFull { .. } | CampusError::NoFreeSpace { .. })
    )));
    assert_eq!(world.free_space(event).await, 0);
    assert_eq!(world.enrolled(event).await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn last_seat_goes_to_exactly_one_of_two() {
    let world = World::new().await;
    let event = world.event(1, EligibilityDescriptor::allow_everyone()).await;
    let a = world.student(1, world.branch, 2).await;
    let b = world.student(2, world.branch, 2).await;

    let (ra, rb) = tokio::join!(
        {
            let db = world.db.clone();
            tokio::spawn(async move { orchestrator::join_event(&db, event, a).await })
        },
        {
            let db = world.db.clone();
            tokio::spawn(async move { orchestrator::join_event(&db, event, b).await })
        }
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert!(ra.is_ok() ^ rb.is_ok(), "{ra:?} {rb:?}");
    let loser = if ra.is_ok() { rb } else { ra };
    assert!(matches!(
        loser,
        Err(CampusError::EventFull { .. } | CampusError::NoFreeSpace { .. })
    ));
    assert_eq!(world.free_space(event).await, 0);
}

#[tokio::test]
async fn random_join_unjoin_keeps_the_books_balanced() {
    const LIMIT: i32 = 5;

    let world = World::new().await;
    let event = world.event(LIMIT, EligibilityDescriptor::allow_everyone()).await;
    let students = world.students(9).await;
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..400 {
        let student = students[rng.gen_range(0..students.len())];
        let result = if rng.gen_bool(0.6) {
            ledger::join(&world.db, event, student).await
        } else {
            ledger::unjoin(&world.db, event, student).await
        };

        if let Err(e) = result {
            assert!(
                matches!(
                    e,
                    CampusError::AlreadyJoined { .. }
                        | CampusError::NoFreeSpace { .. }
                        | CampusError::NotAMember { .. }
                ),
                "{e:?}"
            );
        }

        let free_space = world.free_space(event).await;
        assert!((0..=LIMIT).contains(&free_space));
        assert_eq!(i64::from(free_space) + world.enrolled(event).await, i64::from(LIMIT));
    }
}

#[tokio::test]
async fn joining_twice_only_takes_one_seat() {
    let world = World::new().await;
    let event = world.event(4, EligibilityDescriptor::allow_everyone()).await;
    let student = world.student(1, world.branch, 1).await;

    orchestrator::join_event(&world.db, event, student).await.unwrap();
    assert!(matches!(
        orchestrator::join_event(&world.db, event, student).await,
        Err(CampusError::AlreadyJoined { .. })
    ));
    assert!(matches!(
        ledger::join(&world.db, event, student).await,
        Err(CampusError::AlreadyJoined { .. })
    ));
    assert_eq!(world.free_space(event).await, 3);
    assert_eq!(world.enrolled(event).await, 1);
}

#[tokio::test]
async fn join_then_unjoin_is_a_no_op() {
    let world = World::new().await;
    let event = world.event(4, EligibilityDescriptor::allow_everyone()).await;
    let student = world.student(1, world.branch, 1).await;
    let before = world.free_space(event).await;

    orchestrator::join_event(&world.db, event, student).await.unwrap();
    orchestrator::unjoin_event(&world.db, event, student).await.unwrap();

    assert_eq!(world.free_space(event).await, before);
    assert!(world.db.enrolment(event, student).await.unwrap().is_none());
}

#[tokio::test]
async fn unjoin_without_joining() {
    let world = World::new().await;
    let event = world.event(4, EligibilityDescriptor::allow_everyone()).await;
    let student = world.student(1, world.branch, 1).await;

    assert!(matches!(
        orchestrator::unjoin_event(&world.db, event, student).await,
        Err(CampusError::NotAMember { .. })
    ));
    assert_eq!(world.free_space(event).await, 4);
}

#[tokio::test]
async fn eligibility_holds_with_space_and_open_status() {
    let world = World::new().await;
    let allowed = world.student(1, world.branch, 3).await;
    let refused = world.student(2, world.other_branch, 3).await;
    let event = world
        .event(
            10,
            EligibilityDescriptor::from_lists(vec![world.branch.unsigned_abs()], vec![]),
        )
        .await;

    orchestrator::join_event(&world.db, event, allowed).await.unwrap();
    assert!(matches!(
        orchestrator::join_event(&world.db, event, refused).await,
        Err(CampusError::NotEligible { .. })
    ));
    assert_eq!(world.free_space(event).await, 9);
}

#[tokio::test]
async fn closed_events_are_closed_whatever_the_space() {
    let world = World::new().await;
    let student = world.student(1, world.branch, 1).await;
    let event = world.event(100, EligibilityDescriptor::allow_everyone()).await;
    world.db.set_event_status(event, false).await.unwrap();

    assert!(matches!(
        orchestrator::join_event(&world.db, event, student).await,
        Err(CampusError::EventClosed { .. })
    ));
    assert_eq!(world.free_space(event).await, 100);
}

#[tokio::test]
async fn stalled_lock_holder_times_out_the_next_join() {
    let world = World::with_lock_timeout(Duration::from_millis(100)).await;
    let event = world.event(2, EligibilityDescriptor::allow_everyone()).await;
    let student = world.student(1, world.branch, 1).await;

    let mut stalled = world.db.begin_ledger().await.unwrap();
    stalled.lock_event(event).await.unwrap();

    let err = ledger::join(&world.db, event, student).await.unwrap_err();
    assert!(matches!(err, CampusError::LockTimeout { .. }));
    assert!(err.is_retryable());

    drop(stalled);
    ledger::join(&world.db, event, student).await.unwrap();
    assert_eq!(world.free_space(event).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_lock_bounds_joins_and_never_blocks_reads() {
    let world = World::with_lock_timeout(Duration::from_millis(100)).await;
    let event = world.event(2, EligibilityDescriptor::allow_everyone()).await;
    let student = world.student(1, world.branch, 1).await;

    let mut held = world.db.begin_ledger().await.unwrap();
    held.lock_event(event).await.unwrap();

    let joined = timeout(
        Duration::from_secs(2),
        orchestrator::join_event(&world.db, event, student),
    )
    .await
    .expect("join waited past the lock timeout");
    let err = joined.unwrap_err();
    assert!(matches!(err, CampusError::LockTimeout { .. }), "{err:?}");
    assert!(err.is_retryable());

    let listed = timeout(Duration::from_secs(2), projector::all_events(&world.db))
        .await
        .expect("listing waited on the held lock")
        .unwrap();
    assert_eq!(listed.len(), 1);
    let counted = timeout(
        Duration::from_secs(2),
        projector::count_enrolments(&world.db, event),
    )
    .await
    .expect("counting waited on the held lock")
    .unwrap();
    assert_eq!(counted, 0);

    drop(held);
    orchestrator::join_event(&world.db, event, student).await.unwrap();
    assert_eq!(world.free_space(event).await, 1);
}
