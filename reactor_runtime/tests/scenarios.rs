//! End-to-end scenarios (§8, §8-FULL), exercised against the public
//! `Scheduler` API rather than internal module seams (those get their own
//! `#[cfg(test)]` coverage alongside each module).

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reactor_runtime::{
    ChainId, Config, Context, Event, Level, MitPolicy, PhysicalEvent, Reaction, ReactorGraph,
    ReactorKey, ReactorSelf, Scheduler, Tag, Timestamp, Trigger, TriggerKind,
};

/// S1: timer with `offset=100ms, period=50ms`, timeout `200ms`. Expected
/// firing tags: `(100ms,0), (150ms,0), (200ms,0)`.
#[test]
fn s1_timer_cadence() {
    let mut graph = ReactorGraph::new();
    let reactor = graph.add_reactor(ReactorSelf::new(ReactorKey::from(0), "r", ()));
    let fire_times = Arc::new(Mutex::new(Vec::new()));
    let fire_times2 = fire_times.clone();
    let reaction = graph.add_reaction(Reaction::new(
        "on_timer",
        reactor,
        move |ctx: &mut Context| {
            fire_times2.lock().unwrap().push(ctx.tag().time().as_nanos());
        },
        Level(0),
        ChainId::NONE,
    ));
    let timer = Trigger::new(
        "t",
        TriggerKind::Timer { period: Some(50_000_000) },
        100_000_000,
        0,
        MitPolicy::Drop,
        vec![reaction],
        0,
    );
    graph.add_trigger(timer);

    let config = Config::new().with_timeout(Timestamp::from_nanos(200_000_000));
    let mut scheduler = Scheduler::new(graph, config);
    scheduler.run().unwrap();

    assert_eq!(
        *fire_times.lock().unwrap(),
        vec![100_000_000, 150_000_000, 200_000_000]
    );
}

/// S4: a physical action scheduled from another thread, via
/// `Scheduler::physical_sender`, wakes the scheduler out of its idle wait
/// and runs the reaction bound to it.
#[test]
fn s4_physical_action_from_another_thread() {
    let mut graph = ReactorGraph::new();
    let reactor = graph.add_reactor(ReactorSelf::new(ReactorKey::from(0), "r", ()));
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = ran.clone();
    let reaction = graph.add_reaction(Reaction::new(
        "on_physical",
        reactor,
        move |ctx: &mut Context| {
            ran2.fetch_add(1, Ordering::SeqCst);
            ctx.request_stop();
        },
        Level(0),
        ChainId::NONE,
    ));
    let trigger = Trigger::new("p", TriggerKind::PhysicalAction, 0, 0, MitPolicy::Drop, vec![reaction], 0);
    let trigger_key = graph.add_trigger(trigger);

    let mut scheduler = Scheduler::new(graph, Config::new().with_keep_alive(true));
    let sender = scheduler.physical_sender();
    std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        sender
            .send(PhysicalEvent { event: Event { trigger: trigger_key, tag: Tag::ZERO, token: None } })
            .unwrap();
    });

    scheduler.run().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

/// S5: a reaction calls `request_stop` at `(5ms,0)`. The run terminates
/// instead of running forever, even though `keep_alive` isn't set.
#[test]
fn s5_stop_semantics() {
    let mut graph = ReactorGraph::new();
    let reactor = graph.add_reactor(ReactorSelf::new(ReactorKey::from(0), "r", ()));
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = ran.clone();
    let reaction = graph.add_reaction(Reaction::new(
        "stopper",
        reactor,
        move |ctx: &mut Context| {
            ran2.fetch_add(1, Ordering::SeqCst);
            ctx.request_stop();
        },
        Level(0),
        ChainId::NONE,
    ));
    let timer = Trigger::new("t", TriggerKind::Timer { period: None }, 5_000_000, 0, MitPolicy::Drop, vec![reaction], 0);
    graph.add_trigger(timer);

    let mut scheduler = Scheduler::new(graph, Config::new());
    scheduler.run().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

/// S6: a reaction with `deadline=1ms` is dispatched 3ms late; the deadline
/// handler runs instead of the normal body.
#[test]
fn s6_deadline_miss_invokes_handler() {
    let mut graph = ReactorGraph::new();
    let reactor = graph.add_reactor(ReactorSelf::new(ReactorKey::from(0), "r", ()));
    let normal_ran = Arc::new(AtomicUsize::new(0));
    let deadline_ran = Arc::new(AtomicUsize::new(0));
    let normal_ran2 = normal_ran.clone();
    let deadline_ran2 = deadline_ran.clone();

    let reaction = graph.add_reaction(
        Reaction::new(
            "late",
            reactor,
            move |_: &mut Context| {
                normal_ran2.fetch_add(1, Ordering::SeqCst);
            },
            Level(0),
            ChainId::NONE,
        )
        .with_deadline(1_000_000, move |_: &mut Context| {
            deadline_ran2.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let mut timer = Trigger::new("t", TriggerKind::Timer { period: None }, 0, 0, MitPolicy::Drop, vec![reaction], 0);
    timer.dependents = vec![reaction];
    graph.add_trigger(timer);

    // Force a physical clock reading far past the logical tag so the
    // deadline always appears missed, without a real sleep.
    struct FarFutureClock(AtomicI64);
    impl reactor_runtime::PhysicalClock for FarFutureClock {
        fn now(&self) -> Timestamp {
            Timestamp::from_nanos(self.0.load(Ordering::SeqCst))
        }
    }

    let mut scheduler = Scheduler::new(graph, Config::new()).with_clock(FarFutureClock(AtomicI64::new(3_000_000)));
    scheduler.run().unwrap();

    assert_eq!(deadline_ran.load(Ordering::SeqCst), 1);
    assert_eq!(normal_ran.load(Ordering::SeqCst), 0);
}

/// S9: a panicking reaction does not stop sibling reactions at the same tag
/// from running, nor does it poison the rest of the run.
#[test]
fn s9_panicking_reaction_does_not_poison_the_run() {
    let mut graph = ReactorGraph::new();
    let reactor = graph.add_reactor(ReactorSelf::new(ReactorKey::from(0), "r", ()));
    let survived = Arc::new(AtomicUsize::new(0));
    let survived2 = survived.clone();

    let panicking = graph.add_reaction(Reaction::new(
        "boom",
        reactor,
        |_: &mut Context| panic!("simulated reaction failure"),
        Level(0),
        ChainId::NONE,
    ));
    let survivor = graph.add_reaction(Reaction::new(
        "survivor",
        reactor,
        move |_: &mut Context| {
            survived2.fetch_add(1, Ordering::SeqCst);
        },
        Level(1),
        ChainId::NONE,
    ));
    let trigger = Trigger::new(
        "t",
        TriggerKind::Timer { period: None },
        0,
        0,
        MitPolicy::Drop,
        vec![panicking, survivor],
        0,
    );
    graph.add_trigger(trigger);

    let mut scheduler = Scheduler::new(graph, Config::new());
    scheduler.run().unwrap();
    assert_eq!(survived.load(Ordering::SeqCst), 1);
}
