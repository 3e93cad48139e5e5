//! Integration tests for the singleton lifecycle: field-level cycles broken
//! through early references, constructor cycles rejected, exactly-once
//! construction under contention, and ordered teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use armature::{Container, ContainerError, ForwardRef, ObjectDescriptor, ObjectRef};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Scheduler {
    executor: ForwardRef<Executor>,
}

struct Executor {
    scheduler: ForwardRef<Scheduler>,
}

fn cyclic_container() -> Container {
    let container = Container::new();
    container
        .register(
            ObjectDescriptor::named("scheduler")
                .with_raw_factory(|cx| {
                    let scheduler = Arc::new(Scheduler {
                        executor: ForwardRef::new(),
                    });
                    cx.expose_early(scheduler.clone() as ObjectRef);
                    let executor = cx.get_typed::<Executor>("executor")?;
                    scheduler.executor.set(executor)?;
                    Ok(scheduler as ObjectRef)
                })
                .build(),
        )
        .unwrap();
    container
        .register(
            ObjectDescriptor::named("executor")
                .with_raw_factory(|cx| {
                    let executor = Arc::new(Executor {
                        scheduler: ForwardRef::new(),
                    });
                    let scheduler = cx.get_typed::<Scheduler>("scheduler")?;
                    executor.scheduler.set(scheduler)?;
                    Ok(executor as ObjectRef)
                })
                .build(),
        )
        .unwrap();
    container
}

#[test]
fn field_level_cycle_closes_through_early_reference() {
    init_tracing();
    let container = cyclic_container();

    let scheduler = container.get_typed::<Scheduler>("scheduler").unwrap();
    let executor = container.get_typed::<Executor>("executor").unwrap();

    // Both ends of the cycle point at the canonical instances
    assert!(Arc::ptr_eq(&scheduler.executor.force().unwrap(), &executor));
    assert!(Arc::ptr_eq(&executor.scheduler.force().unwrap(), &scheduler));
}

#[test]
fn field_level_cycle_resolves_from_either_entry_point() {
    let container = cyclic_container();
    let executor = container.get_typed::<Executor>("executor").unwrap();
    let scheduler = container.get_typed::<Scheduler>("scheduler").unwrap();
    assert!(Arc::ptr_eq(&executor.scheduler.force().unwrap(), &scheduler));
}

fn constructor_cycle_container() -> Container {
    let container = Container::new();
    container
        .register(
            ObjectDescriptor::named("a")
                .with_raw_factory(|cx| cx.get_object("b"))
                .build(),
        )
        .unwrap();
    container
        .register(
            ObjectDescriptor::named("b")
                .with_raw_factory(|cx| cx.get_object("a"))
                .build(),
        )
        .unwrap();
    container
}

#[test]
fn constructor_cycle_is_rejected_from_both_entry_points() {
    for entry in ["a", "b"] {
        let container = constructor_cycle_container();
        let err = container.get_object(entry).unwrap_err();
        assert!(
            matches!(err, ContainerError::CurrentlyInCreation { .. }),
            "expected an in-creation failure for entry '{entry}', got: {err}"
        );
    }
}

#[test]
fn failed_cycle_leaves_the_container_usable() {
    let container = constructor_cycle_container();
    container.get_object("a").unwrap_err();

    // Replacing one side breaks the cycle and construction succeeds
    container
        .register(
            ObjectDescriptor::named("b")
                .with_factory(|_| Ok("leaf".to_string()))
                .build(),
        )
        .unwrap();
    container.get_object("a").unwrap();
}

#[test]
fn concurrent_retrieval_constructs_exactly_once() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);

    let container = Arc::new(Container::new());
    container
        .register(
            ObjectDescriptor::named("svc")
                .with_factory(|_| {
                    BUILT.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    Ok("ready".to_string())
                })
                .build(),
        )
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || container.get_typed::<String>("svc").unwrap())
        })
        .collect();
    let instances: Vec<Arc<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
}

fn chained_container(log: Arc<Mutex<Vec<&'static str>>>) -> Container {
    let container = Container::new();
    for (name, dep, label) in [
        ("gateway", Some("session"), "gateway"),
        ("session", Some("pool"), "session"),
        ("pool", None, "pool"),
    ] {
        let log = log.clone();
        let mut builder = ObjectDescriptor::named(name).with_factory(move |cx| {
            if let Some(dep) = dep {
                cx.get_object(dep)?;
            }
            Ok(name.to_string())
        });
        builder = builder.with_disposer(move |_: &String| {
            log.lock().push(label);
            Ok(())
        });
        container.register(builder.build()).unwrap();
    }
    container
}

#[test]
fn destroy_all_runs_disposers_in_reverse_dependency_order() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = chained_container(log.clone());

    container.get_object("gateway").unwrap();
    container.destroy_all();

    assert_eq!(*log.lock(), vec!["gateway", "session", "pool"]);
}

#[test]
fn destroying_a_dependency_tears_down_its_dependents_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = chained_container(log.clone());

    container.get_object("gateway").unwrap();
    container.destroy("pool");

    assert_eq!(*log.lock(), vec!["gateway", "session", "pool"]);
    // The rest of the container keeps working
    container.get_object("gateway").unwrap();
}

#[test]
fn destroy_all_permanently_rejects_new_creation() {
    let container = Container::new();
    container
        .register(
            ObjectDescriptor::named("svc")
                .with_factory(|_| Ok(0u8))
                .build(),
        )
        .unwrap();
    container.get_object("svc").unwrap();

    container.destroy_all();
    let err = container.get_object("svc").unwrap_err();
    assert!(matches!(err, ContainerError::CreationRejected { .. }));

    // Idempotent: a second full teardown changes nothing
    container.destroy_all();
    assert!(matches!(
        container.get_object("svc").unwrap_err(),
        ContainerError::CreationRejected { .. }
    ));
}

#[test]
fn panicking_factory_does_not_wedge_the_name() {
    let container = Container::new();
    container
        .register(
            ObjectDescriptor::named("svc")
                .with_factory(|_| -> Result<u8, ContainerError> { panic!("boom") })
                .build(),
        )
        .unwrap();

    let unwind = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = container.get_object("svc");
    }));
    assert!(unwind.is_err());

    // A healthy redefinition builds normally afterwards
    container
        .register(
            ObjectDescriptor::named("svc")
                .with_factory(|_| Ok(7u8))
                .build(),
        )
        .unwrap();
    assert_eq!(*container.get_typed::<u8>("svc").unwrap(), 7);
}

#[test]
fn disposers_only_run_for_instances_that_were_built() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = chained_container(log.clone());

    // Only the leaf is built; the others never existed
    container.get_object("pool").unwrap();
    container.destroy_all();

    assert_eq!(*log.lock(), vec!["pool"]);
}
