//! Tests for the task dependency model: ordering edges, run conditions,
//! and completion fan-out across workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use flowd::signal::Signal;
use flowd::tasks::{Invoker, Task, TaskInvocation, TaskState};
use flowd::worker::Worker;

fn submit(worker: &Worker, task: &Arc<Task>) -> Arc<flowd::tasks::TaskFuture> {
    worker.add_task(TaskInvocation::new(task.clone(), Invoker::local("test")))
}

#[test]
fn successor_waits_for_predecessor_across_workers() {
    let worker_a = Worker::new("a");
    let worker_b = Worker::new("b");
    let exec_a = worker_a.spawn_executor().unwrap();
    let exec_b = worker_b.spawn_executor().unwrap();

    let first = Arc::new(Task::new("first", |_m, _i, _a, _k| Ok(json!("first"))));
    let second = Arc::new(
        Task::new("second", |_m, _i, _a, _k| Ok(json!("second"))).with_run_after(&first),
    );

    // Submit the successor first: worker B blocks on the gate.
    let second_future = submit(&worker_b, &second);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(second_future.state(), TaskState::Started);
    assert!(second_future.get(false).is_none());

    // Completing the predecessor releases it.
    let first_future = submit(&worker_a, &first);
    first_future.wait();
    assert!(second_future.wait().is_success());

    worker_a.stop();
    worker_b.stop();
    exec_a.join().unwrap();
    exec_b.join().unwrap();
}

#[test]
fn gate_resets_after_each_consumption() {
    let invoker = Invoker::local("test");
    let first = Arc::new(Task::new("first", |_m, _i, _a, _k| Ok(Value::Null)));
    let second = Arc::new(
        Task::new("second", |_m, _i, _a, _k| Ok(Value::Null)).with_run_after(&first),
    );

    // First cycle: predecessor completes, successor consumes the gate.
    first.invoke(&invoker, &[], &Map::new());
    assert!(second.invoke(&invoker, &[], &Map::new()).is_success());

    // Second cycle: the gate was reset, so the successor blocks again.
    let waiter = {
        let second = second.clone();
        std::thread::spawn(move || second.invoke(&Invoker::local("test"), &[], &Map::new()))
    };
    std::thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());

    first.invoke(&invoker, &[], &Map::new());
    assert!(waiter.join().unwrap().is_success());
}

#[test]
fn skipped_task_still_releases_dependents() {
    let worker = Worker::new("w");
    let executor = worker.spawn_executor().unwrap();

    let skipped = Arc::new(
        Task::new("skipped", |_m, _i, _a, _k| Ok(json!("never"))).with_run_only(false),
    );
    let dependent = Arc::new(
        Task::new("dependent", |_m, _i, _a, _k| Ok(json!("ran"))).with_run_after(&skipped),
    );

    let skipped_future = submit(&worker, &skipped);
    let outcome = skipped_future.wait();
    assert!(!outcome.is_success());

    // The skip fired the trigger, so the dependent does not block.
    let dependent_future = submit(&worker, &dependent);
    assert!(dependent_future.wait().is_success());

    worker.stop();
    executor.join().unwrap();
}

#[test]
fn trigger_signals_fire_in_registration_order_after_execution() {
    let worker = Worker::new("w");
    let executor = worker.spawn_executor().unwrap();

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let task = {
        let order = order.clone();
        Arc::new(Task::new("observed", move |_m, _i, _a, _k| {
            order.lock().unwrap().push("run");
            Ok(Value::Null)
        }))
    };
    for label in ["trigger-1", "trigger-2"] {
        let order = order.clone();
        task.trigger.add(Arc::new(Signal::from_fn(move |_| {
            order.lock().unwrap().push(label);
        })));
    }

    submit(&worker, &task).wait();
    assert_eq!(*order.lock().unwrap(), vec!["run", "trigger-1", "trigger-2"]);

    worker.stop();
    executor.join().unwrap();
}

#[test]
fn lifecycle_signals_observe_every_invocation() {
    let worker = Worker::new("w");
    let executor = worker.spawn_executor().unwrap();

    let starts = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let task = Arc::new(Task::new("flaky", |_m, _i, args, _k| {
        if args.first().and_then(Value::as_bool) == Some(true) {
            Ok(Value::Null)
        } else {
            Err("requested failure".into())
        }
    }));
    {
        let starts = starts.clone();
        task.on_start.connect(move |_| {
            starts.fetch_add(1, Ordering::SeqCst);
        });
        let errors = errors.clone();
        task.on_error.connect(move |_| {
            errors.fetch_add(1, Ordering::SeqCst);
        });
    }

    let ok = worker.add_task(
        TaskInvocation::new(task.clone(), Invoker::local("test")).with_args(vec![json!(true)]),
    );
    let failed = worker.add_task(
        TaskInvocation::new(task.clone(), Invoker::local("test")).with_args(vec![json!(false)]),
    );
    assert!(ok.wait().is_success());
    assert!(!failed.wait().is_success());

    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    worker.stop();
    executor.join().unwrap();
}
