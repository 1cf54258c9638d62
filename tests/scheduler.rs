use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use orbit_sched::{Scheduler, TaskMode};
use tracing::Level;

fn enable_tracing() {
    drop(tracing_subscriber::fmt().with_max_level(Level::TRACE).try_init());
}

#[test]
fn two_threads_one_core() {
    enable_tracing();

    let scheduler = Scheduler::builder().core_pool_size(1).max_pool_size(1).build().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..1000)
        .map(|_| {
            let counter = counter.clone();
            scheduler.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("task should not panic");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    scheduler.close();
}

#[test]
fn blocking_expansion() {
    enable_tracing();

    let scheduler = Scheduler::builder().core_pool_size(2).max_pool_size(16).build().unwrap();
    let start = Instant::now();

    let blocking_handles: Vec<_> = (0..10)
        .map(|_| {
            scheduler.dispatch_with(
                || {
                    sleep(Duration::from_millis(200));
                },
                TaskMode::ProbablyBlocking,
                false,
            )
        })
        .collect();

    let counter = Arc::new(AtomicUsize::new(0));
    let cpu_handles: Vec<_> = (0..10)
        .map(|_| {
            let counter = counter.clone();
            scheduler.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in blocking_handles {
        handle.join().expect("blocking task should not panic");
    }
    for handle in cpu_handles {
        handle.join().expect("cpu task should not panic");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 10);
    assert!(start.elapsed() < Duration::from_millis(800));

    scheduler.close();
}

#[test]
fn semi_fifo_couples_communicating_tasks() {
    enable_tracing();

    let scheduler = Scheduler::builder().core_pool_size(1).max_pool_size(1).build().unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let order_clone = order.clone();
    let inner_scheduler = scheduler.clone();
    let handle = scheduler.dispatch(move || {
        let order_a = order_clone.clone();
        let order_b = order_clone.clone();

        inner_scheduler.dispatch(move || {
            order_a.lock().unwrap().push('a');
        });
        inner_scheduler.dispatch(move || {
            order_b.lock().unwrap().push('b');
        });
    });

    handle.join().unwrap();

    // Give the worker a moment to drain the two freshly-pushed tasks.
    sleep(Duration::from_millis(50));

    let recorded = order.lock().unwrap().clone();
    assert_eq!(recorded, vec!['b', 'a'], "newest head-slot push should run first");

    scheduler.close();
}

#[test]
fn externally_dispatched_work_is_not_starved_by_a_busy_local_queue() {
    enable_tracing();

    let scheduler = Scheduler::builder().core_pool_size(1).max_pool_size(1).build().unwrap();

    // Prime the one worker and let it settle.
    scheduler.dispatch(|| {}).join().unwrap();
    sleep(Duration::from_millis(20));

    // A worker, while running, keeps pushing fresh work into its own local
    // queue; meanwhile a task dispatched from outside any worker must still
    // land on the global queue and complete within a bounded time.
    let busy_flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let busy_flag_clone = busy_flag.clone();
    let inner_scheduler = scheduler.clone();
    let _keep_busy = scheduler.dispatch(move || {
        fn requeue(scheduler: Scheduler, flag: Arc<std::sync::atomic::AtomicBool>) {
            if flag.load(Ordering::SeqCst) {
                let scheduler2 = scheduler.clone();
                let flag2 = flag.clone();
                scheduler.dispatch(move || requeue(scheduler2, flag2));
            }
        }

        requeue(inner_scheduler, busy_flag_clone);
    });

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_clone = order.clone();
    let global_handle = scheduler.dispatch(move || {
        order_clone.lock().unwrap().push("global");
    });

    global_handle.join().expect("externally dispatched task should complete");
    busy_flag.store(false, Ordering::SeqCst);

    assert_eq!(*order.lock().unwrap(), vec!["global"]);

    scheduler.close();
}

#[test]
fn shutdown_is_idempotent_and_deterministic() {
    enable_tracing();

    let scheduler = Scheduler::builder().core_pool_size(4).max_pool_size(4).build().unwrap();

    let handles: Vec<_> = (0..100).map(|_| scheduler.dispatch(|| {})).collect();
    for handle in handles {
        handle.join().unwrap();
    }

    scheduler.close();
    scheduler.close(); // idempotent

    let snapshot = scheduler.to_string();
    assert!(snapshot.contains("core pool size = 4"));
}

#[test]
fn configuration_faults_are_rejected_fail_fast() {
    let zero_core = Scheduler::builder().core_pool_size(0).build();
    assert!(zero_core.is_err());

    let max_below_core = Scheduler::builder().core_pool_size(4).max_pool_size(2).build();
    assert!(max_below_core.is_err());
}

#[test]
fn uncaught_panics_are_reported_and_visible_on_the_join_handle() {
    enable_tracing();

    let reported = Arc::new(AtomicUsize::new(0));
    let reported_clone = reported.clone();

    let mut builder = Scheduler::builder();
    builder.core_pool_size(1).max_pool_size(1).with_hooks(|hooks| {
        hooks.set_on_uncaught_fault_fn(move |_payload| {
            reported_clone.fetch_add(1, Ordering::SeqCst);
        });
    });

    let scheduler = builder.build().unwrap();

    let handle = scheduler.dispatch(|| -> () {
        panic!("boom");
    });

    let result = handle.join();
    assert!(result.is_err());
    assert_eq!(reported.load(Ordering::SeqCst), 1);

    scheduler.close();
}
