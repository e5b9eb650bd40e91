// crates/meridian-eventcheck/tests/scenarios.rs
//
// Checker behavior across the public API: allowance reset at epoch
// rollover, future-dated events, interest filtering, shutdown with queued work, exactly-once
// completion, and context snapshots under concurrent swaps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use meridian_core::{
    Event, EventId, GasPowerRules, InterestFilter, Keypair, Rules, UnsignedEvent, Validator, ValidatorId,
    ValidatorSet,
};
use meridian_eventcheck::stages::{GasPowerCheck, HeavyCheck};
use meridian_eventcheck::{
    Check, CheckError, Checkers, EpochContext, EpochContextCell, EventTask, HeavyCheckConfig, HeavyCheckQueue,
    OnChecked, Pipeline, RejectReason, Verdict,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn rules() -> Rules {
    Rules {
        gas: GasPowerRules {
            alloc_per_sec: 10_000,
            max_alloc_period_ms: 10_000,
            startup_alloc_period_ms: 10_000,
            ..GasPowerRules::default()
        },
        ..Rules::default()
    }
}

struct Keys {
    keypairs: Vec<Keypair>,
}

impl Keys {
    fn new(n: usize) -> Self {
        Self {
            keypairs: (0..n).map(|_| Keypair::generate()).collect(),
        }
    }

    fn validators(&self) -> ValidatorSet {
        ValidatorSet::new(self.keypairs.iter().enumerate().map(|(i, kp)| Validator {
            id: ValidatorId(i as u32 + 1),
            public_key: kp.public_key_bytes(),
            weight: 1,
        }))
    }

    fn context(&self, epoch: u32) -> EpochContext {
        EpochContext::new(epoch, self.validators(), rules(), Utc::now())
    }

    fn event(&self, creator: u32, epoch: u32, nonce: i64) -> Arc<Event> {
        let mut e = UnsignedEvent::new(ValidatorId(creator), vec![]);
        e.epoch = epoch;
        e.seq = 1;
        e.lamport = 1;
        e.created_at += chrono::Duration::microseconds(nonce);
        e.gas_power_used = rules().gas.event_cost(0, 0, 0);
        Arc::new(e.sign(&self.keypairs[creator as usize - 1]))
    }
}

struct Everything;

impl InterestFilter for Everything {
    fn only_interested(&self, ids: &[EventId]) -> Vec<EventId> {
        ids.to_vec()
    }
}

/// Interested in a fixed id set; counts every query.
struct Only {
    wanted: Vec<EventId>,
    asked: AtomicUsize,
}

impl InterestFilter for Only {
    fn only_interested(&self, ids: &[EventId]) -> Vec<EventId> {
        self.asked.fetch_add(ids.len(), Ordering::SeqCst);
        ids.iter().filter(|id| self.wanted.contains(id)).copied().collect()
    }
}

/// Counts invocations, then passes.
struct Counting(Arc<AtomicUsize>);

impl Check for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn check(&self, _event: &Event, _parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sleeps, then passes.
struct Slow(Duration);

impl Check for Slow {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn check(&self, _event: &Event, _parents: &[Arc<Event>]) -> Result<(), RejectReason> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

/// Records how many times each event was completed.
fn completion_counter() -> (OnChecked, Arc<Mutex<HashMap<EventId, (usize, Option<Verdict>)>>>) {
    let seen = Arc::new(Mutex::new(HashMap::new()));
    let s = seen.clone();
    let on_done: OnChecked = Arc::new(move |tasks: Vec<EventTask>| {
        let mut seen = s.lock();
        for task in tasks {
            let entry = seen.entry(task.event().id).or_insert((0, None));
            entry.0 += 1;
            entry.1 = task.verdict().cloned();
        }
    });
    (on_done, seen)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_exhausted_allowance_passes_after_rollover() {
    let keys = Keys::new(1);
    let cell = Arc::new(EpochContextCell::new(keys.context(1)));
    let gas = GasPowerCheck::new(cell.clone());
    let heavy = HeavyCheck::new(cell.clone());

    // Self-parent left with nothing; its successor claims more than one
    // second of accrual can provide.
    let mut sp = UnsignedEvent::new(ValidatorId(1), vec![]);
    sp.epoch = 1;
    sp.seq = 1;
    sp.lamport = 1;
    sp.gas_power_used = rules().gas.event_cost(0, 0, 0);
    sp.gas_power_left = 0;
    let sp = Arc::new(sp.sign(&keys.keypairs[0]));

    let mut e = UnsignedEvent::new(ValidatorId(1), vec![sp.id]);
    e.epoch = 1;
    e.seq = 2;
    e.lamport = 2;
    e.created_at = sp.created_at + chrono::Duration::seconds(1);
    e.gas_power_used = rules().gas.event_cost(1, 0, 0);
    e.gas_power_left = 20_000;
    let e = Arc::new(e.sign(&keys.keypairs[0]));
    let parents = vec![sp.clone()];

    assert!(matches!(
        gas.check(&e, &parents),
        Err(RejectReason::InsufficientGasPower { .. })
    ));

    // New epoch: the old self-parent no longer counts, the startup
    // allocation (100_000) covers the claim.
    cell.swap(keys.context(2));
    assert_eq!(gas.check(&e, &parents), Ok(()));
    // Still subject to the signature stage, which knows only epoch 2 keys.
    assert_eq!(
        heavy.check(&e, &parents),
        Err(RejectReason::StaleEpoch { event: 1, current: 2 })
    );
}

#[test]
fn test_future_dated_chain_cannot_refill_allowance() {
    let keys = Keys::new(1);
    let cell = Arc::new(EpochContextCell::new(keys.context(1)));
    let pipeline = Pipeline::standard(cell.clone());
    let max_stashed = cell.load().validator_gas(ValidatorId(1)).unwrap().max_stashed;

    // Each event spends all but its own cost of a full stash.
    let claim = |e: &mut UnsignedEvent| {
        e.gas_power_used = rules().gas.event_cost(e.parents.len(), 0, 0);
        e.gas_power_left = max_stashed - e.gas_power_used;
    };

    let mut first = UnsignedEvent::new(ValidatorId(1), vec![]);
    first.epoch = 1;
    first.seq = 1;
    first.lamport = 1;
    claim(&mut first);
    let first = Arc::new(first.sign(&keys.keypairs[0]));
    assert_eq!(pipeline.validate(&first, &[]), Verdict::Accepted);

    let next = |sp: &Arc<Event>, ahead: chrono::Duration| {
        let mut e = UnsignedEvent::new(ValidatorId(1), vec![sp.id]);
        e.epoch = 1;
        e.seq = sp.seq + 1;
        e.lamport = sp.lamport + 1;
        e.created_at = sp.created_at + ahead;
        claim(&mut e);
        Arc::new(e.sign(&keys.keypairs[0]))
    };

    // Dating the successor an hour ahead would accrue a full stash.
    let mut sp = first.clone();
    for _ in 0..5 {
        let e = next(&sp, chrono::Duration::hours(1));
        assert!(matches!(
            pipeline.validate(&e, &[sp.clone()]),
            Verdict::Rejected(RejectReason::Malformed(_))
        ));
        sp = e;
    }

    // Honestly dated, one second accrues far less than the claim.
    let honest = next(&first, chrono::Duration::seconds(1));
    assert!(matches!(
        pipeline.validate(&honest, &[first.clone()]),
        Verdict::Rejected(RejectReason::InsufficientGasPower { .. })
    ));
}

#[tokio::test]
async fn test_only_interesting_tasks_are_checked() {
    let keys = Keys::new(1);
    let cell = Arc::new(EpochContextCell::new(keys.context(1)));
    let events: Vec<Arc<Event>> = (0..100).map(|n| keys.event(1, 1, n)).collect();
    let wanted: Vec<EventId> = events
        .iter()
        .step_by(5)
        .chain(events.iter().skip(1).step_by(5))
        .map(|e| e.id)
        .collect();
    assert_eq!(wanted.len(), 40);

    let light_runs = Arc::new(AtomicUsize::new(0));
    let standard = Pipeline::standard(cell.clone());
    let mut light: Vec<Arc<dyn Check>> = vec![Arc::new(Counting(light_runs.clone()))];
    light.extend(standard.light().iter().cloned());
    let pipeline = Pipeline::new(light, standard.heavy().to_vec());

    let interest = Arc::new(Only {
        wanted: wanted.clone(),
        asked: AtomicUsize::new(0),
    });
    let checkers = Checkers::new(pipeline, &HeavyCheckConfig::default(), interest.clone()).unwrap();

    let (on_done, seen) = completion_counter();
    let tasks = events.iter().map(|e| EventTask::new(e.clone(), vec![])).collect();
    checkers.enqueue(tasks, on_done).await.unwrap();
    checkers.close().await;

    assert_eq!(interest.asked.load(Ordering::SeqCst), 100);
    assert_eq!(light_runs.load(Ordering::SeqCst), 40);

    let seen = seen.lock();
    assert_eq!(seen.len(), 100);
    for event in &events {
        let (count, verdict) = &seen[&event.id];
        assert_eq!(*count, 1);
        if wanted.contains(&event.id) {
            assert_eq!(verdict, &Some(Verdict::Accepted));
        } else {
            assert_eq!(verdict, &None);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_completes_in_flight_tasks() {
    let keys = Keys::new(1);
    let config = HeavyCheckConfig {
        threads: 2,
        max_batch: 1,
        max_queued_batches: 10,
    };
    let stages: Vec<Arc<dyn Check>> = vec![Arc::new(Slow(Duration::from_millis(20)))];
    let queue = HeavyCheckQueue::new(stages, &config).unwrap();

    let (on_done, seen) = completion_counter();
    let tasks = (0..10).map(|n| EventTask::new(keys.event(1, 1, n), vec![])).collect();
    queue.enqueue(tasks, on_done.clone()).await.unwrap();

    queue.close().await;
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 10);
        assert!(seen
            .values()
            .all(|(count, verdict)| *count == 1 && verdict == &Some(Verdict::Accepted)));
    }

    // After close, new work is terminated rather than lost.
    let late = keys.event(1, 1, 99);
    let result = queue.enqueue(vec![EventTask::new(late.clone(), vec![])], on_done).await;
    assert!(matches!(result, Err(CheckError::QueueClosed)));
    assert_eq!(
        seen.lock()[&late.id],
        (1, Some(Verdict::Rejected(RejectReason::Terminated)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_complete_exactly_once() {
    let keys = Arc::new(Keys::new(4));
    let cell = Arc::new(EpochContextCell::new(keys.context(1)));
    let config = HeavyCheckConfig {
        threads: 3,
        max_batch: 7,
        max_queued_batches: 2,
    };
    let checkers = Arc::new(Checkers::new(Pipeline::standard(cell), &config, Arc::new(Everything)).unwrap());
    let (on_done, seen) = completion_counter();

    let mut handles = Vec::new();
    for creator in 1..=4u32 {
        let keys = keys.clone();
        let checkers = checkers.clone();
        let on_done = on_done.clone();
        handles.push(tokio::spawn(async move {
            let tasks = (0..50)
                .map(|n| {
                    // Every third event claims another epoch.
                    let epoch = if n % 3 == 0 { 9 } else { 1 };
                    EventTask::new(keys.event(creator, epoch, n), vec![])
                })
                .collect();
            checkers.enqueue(tasks, on_done).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    checkers.close().await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 200);
    assert!(seen.values().all(|(count, verdict)| *count == 1 && verdict.is_some()));
    let stale = seen
        .values()
        .filter(|(_, v)| matches!(v, Some(Verdict::Rejected(RejectReason::StaleEpoch { .. }))))
        .count();
    let accepted = seen.values().filter(|(_, v)| v == &Some(Verdict::Accepted)).count();
    assert_eq!(stale, 4 * 17);
    assert_eq!(accepted, 200 - 4 * 17);
}

#[test]
fn test_context_snapshots_are_never_torn() {
    let keys: Vec<Keys> = (1..=4).map(Keys::new).collect();
    let cell = Arc::new(EpochContextCell::new(keys[0].context(1)));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cell = cell.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut loads = 0u64;
                while !stop.load(Ordering::Acquire) {
                    let ctx = cell.load();
                    assert!(ctx.is_consistent());
                    // Epoch n always carries the validator set of size ((n - 1) % 4) + 1.
                    assert_eq!(ctx.validators().len() as u32, (ctx.epoch() - 1) % 4 + 1);
                    loads += 1;
                }
                loads
            })
        })
        .collect();

    for epoch in 2..=400u32 {
        let set = &keys[((epoch - 1) % 4) as usize];
        cell.swap(set.context(epoch));
    }
    stop.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(cell.load().epoch(), 400);
}
