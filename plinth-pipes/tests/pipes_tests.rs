//! Integration tests for `PipeRegistry`: linking, copy-once values,
//! teardown from either side and event-pipe invocation.

use plinth_pipes::{
    DisposeReport, FieldCell, LinkRequest, PipeDecl, PipeError, PipeRegistry, PipeValue, Slot, SlotType,
    ValueType, PipeKind,
};
use plinth_types::testing::RecordingLogger;
use plinth_types::{Plugin, PluginId, PluginStatus, Severity};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

fn id(raw: &str) -> PluginId {
    PluginId::new(raw).unwrap()
}

fn registry(plugins: &[&str]) -> (PipeRegistry, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::new());
    let registry = PipeRegistry::new(logger.clone());
    for raw in plugins {
        registry.attach(&Plugin::new(id(raw))).unwrap();
    }
    (registry, logger)
}

fn enable(registry: &PipeRegistry, raw: &str) {
    registry.set_status(&id(raw), PluginStatus::Enabled).unwrap();
}

// ================================================================
// Linking
// ================================================================

#[test]
fn linked_value_is_copied_once() {
    let (reg, _) = registry(&["scores", "board"]);
    let score = FieldCell::new(0);
    reg.declare(&id("scores"), PipeDecl::field("score", ValueType::Int, score.clone()))
        .unwrap();

    let slot = Slot::value("score", ValueType::Int);
    reg.link(&id("board"), &slot, &id("scores"), "score").unwrap();
    assert_eq!(slot.get(), Some(PipeValue::Int(0)));

    score.set(42);

    assert_eq!(reg.read(&id("scores"), "score").unwrap(), PipeValue::Int(42));
    assert_eq!(slot.get(), Some(PipeValue::Int(0)));

    reg.link(&id("board"), &slot, &id("scores"), "score").unwrap();
    assert_eq!(slot.get(), Some(PipeValue::Int(42)));
}

#[test]
fn int_pipe_widens_into_float_slot() {
    let (reg, _) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::property("speed", ValueType::Int, || PipeValue::Int(7)))
        .unwrap();
    let slot = Slot::value("speed", ValueType::Float);

    reg.link(&id("b"), &slot, &id("a"), "speed").unwrap();

    assert_eq!(slot.get(), Some(PipeValue::Float(7.0)));
}

#[test]
fn missing_target_is_logged_and_skipped() {
    let (reg, logger) = registry(&["consumer"]);
    let slot = Slot::value("rate", ValueType::Float);

    let err = reg.link(&id("consumer"), &slot, &id("economy"), "rate").unwrap_err();

    assert_eq!(err, PipeError::PluginNotFound("economy".into()));
    assert!(!slot.is_linked());
    assert!(logger.contains(Severity::Error, "rate"));
}

#[test]
fn incompatible_pipe_is_logged_with_slot_and_type() {
    let (reg, logger) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::field("motd", ValueType::Text, FieldCell::new("hi")))
        .unwrap();
    let slot = Slot::value("motd", ValueType::Int);

    let err = reg.link(&id("b"), &slot, &id("a"), "motd").unwrap_err();

    assert!(matches!(err, PipeError::Incompatible { .. }));
    let errors = logger.at(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("'motd'"));
    assert!(errors[0].message.contains("int"));
    assert!(reg.links_of(&id("b")).is_empty());
}

#[test]
fn method_slot_holds_a_callable_handle() {
    let (reg, _) = registry(&["math", "calc"]);
    reg.declare(
        &id("math"),
        PipeDecl::method("add", ValueType::Int, |args| {
            let sum = args.iter().filter_map(PipeValue::as_int).sum::<i64>();
            Ok(PipeValue::Int(sum))
        }),
    )
    .unwrap();
    let slot = Slot::method("add", ValueType::Int);

    reg.link(&id("calc"), &slot, &id("math"), "add").unwrap();

    let handle = slot.pipe().unwrap();
    assert_eq!(slot.get(), None);
    assert_eq!(
        reg.call_ref(handle, &[PipeValue::Int(2), PipeValue::Int(3)]).unwrap(),
        PipeValue::Int(5)
    );
}

#[test]
fn property_wrapper_slot_links_to_field() {
    let (reg, _) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::field("hp", ValueType::Int, FieldCell::new(20)))
        .unwrap();
    let slot = Slot::new("hp", SlotType::Pipe(PipeKind::Property, ValueType::Int));

    reg.link(&id("b"), &slot, &id("a"), "hp").unwrap();

    let binding = slot.binding().unwrap();
    assert_eq!(binding.target, id("a"));
    assert_eq!(binding.value, Some(PipeValue::Int(20)));
}

#[test]
fn link_request_with_unusable_target_fails() {
    let (reg, logger) = registry(&["b"]);
    let request = LinkRequest::new(Slot::value("x", ValueType::Int), "", "x");

    assert!(reg.link_request(&id("b"), &request).is_err());
    assert!(logger.contains(Severity::Error, "'x'"));
}

#[test]
fn link_dependencies_are_distinct_in_first_seen_order() {
    let (reg, logger) = registry(&[]);
    let slot = |name: &str| Slot::value(name, ValueType::Any);
    let requests = vec![
        LinkRequest::new(slot("a"), "economy", "rate"),
        LinkRequest::new(slot("b"), "chat", "prefix"),
        LinkRequest::new(slot("c"), "Economy", "balance"),
        LinkRequest {
            slot: slot("d"),
            target: None,
            pipe: None,
        },
    ];

    assert_eq!(reg.link_dependencies(&requests), vec![id("economy"), id("chat")]);
    assert!(logger.contains(Severity::Debug, "'d'"));
}

// ================================================================
// Teardown
// ================================================================

#[test]
fn disposing_target_clears_consumer_slot() {
    let (reg, _) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::field("level", ValueType::Int, FieldCell::new(3)))
        .unwrap();
    let slot = Slot::value("level", ValueType::Int);
    reg.link(&id("b"), &slot, &id("a"), "level").unwrap();

    let report = reg.dispose(&id("a"));

    assert_eq!(
        report,
        DisposeReport {
            owned_links: 0,
            dependent_links: 1,
            pipes: 1,
        }
    );
    assert!(!slot.is_linked());
    assert!(reg.links_of(&id("b")).is_empty());
    assert!(matches!(
        reg.read(&id("a"), "level"),
        Err(PipeError::PluginNotFound(_))
    ));
}

#[test]
fn disposing_consumer_removes_back_reference() {
    let (reg, _) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::field("level", ValueType::Int, FieldCell::new(3)))
        .unwrap();
    let slot = Slot::value("level", ValueType::Int);
    reg.link(&id("b"), &slot, &id("a"), "level").unwrap();
    assert_eq!(reg.dependents_of(&id("a")), vec![id("b")]);

    let report = reg.dispose(&id("b"));

    assert_eq!(report.owned_links, 1);
    assert!(reg.dependents_of(&id("a")).is_empty());
    assert!(!slot.is_linked());
    assert!(reg.dispose(&id("b")).is_empty());
}

#[test]
fn stale_method_handle_fails_after_target_dispose() {
    let (reg, _) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::method("now", ValueType::Int, |_| Ok(PipeValue::Int(1))))
        .unwrap();
    let slot = Slot::method("now", ValueType::Int);
    reg.link(&id("b"), &slot, &id("a"), "now").unwrap();
    let handle = slot.pipe().unwrap();

    reg.dispose(&id("a"));

    assert_eq!(reg.call_ref(handle, &[]), Err(PipeError::StaleRef));
    assert_eq!(reg.pipe_info(handle), None);
}

#[test]
fn unlink_clears_slot_and_indices() {
    let (reg, _) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::field("v", ValueType::Bool, FieldCell::new(true)))
        .unwrap();
    let slot = Slot::value("v", ValueType::Bool);
    let link = reg.link(&id("b"), &slot, &id("a"), "v").unwrap();

    assert!(reg.unlink(link));
    assert!(!reg.unlink(link));
    assert!(!slot.is_linked());
    assert!(reg.dependents_of(&id("a")).is_empty());
}

// ================================================================
// Access
// ================================================================

#[test]
fn write_respects_readonly_and_setters() {
    let (reg, _) = registry(&["a"]);
    let backing = Arc::new(AtomicI64::new(1));
    let get = Arc::clone(&backing);
    let set = Arc::clone(&backing);
    reg.declare(
        &id("a"),
        PipeDecl::property("volume", ValueType::Int, move || PipeValue::Int(get.load(Ordering::SeqCst)))
            .with_setter(move |value| {
                let level = value.as_int().ok_or_else(|| anyhow::anyhow!("not an int"))?;
                anyhow::ensure!((0..=10).contains(&level), "volume {level} out of range");
                set.store(level, Ordering::SeqCst);
                Ok(())
            }),
    )
    .unwrap();
    reg.declare(
        &id("a"),
        PipeDecl::property("version", ValueType::Text, || "1.2.0".into()),
    )
    .unwrap();

    reg.write(&id("a"), "volume", 8).unwrap();
    assert_eq!(reg.read(&id("a"), "volume").unwrap(), PipeValue::Int(8));

    let err = reg.write(&id("a"), "volume", 11).unwrap_err();
    assert!(matches!(err, PipeError::Callback { .. }));

    assert!(matches!(
        reg.write(&id("a"), "version", "2.0"),
        Err(PipeError::ReadOnly { .. })
    ));
    assert!(matches!(
        reg.write(&id("a"), "volume", "loud"),
        Err(PipeError::TypeMismatch { .. })
    ));
}

#[test]
fn reading_a_method_is_wrong_kind() {
    let (reg, _) = registry(&["a"]);
    reg.declare(&id("a"), PipeDecl::method("m", ValueType::Unit, |_| Ok(PipeValue::Unit)))
        .unwrap();
    assert!(matches!(
        reg.read(&id("a"), "m"),
        Err(PipeError::WrongKind { .. })
    ));
}

// ================================================================
// Event pipes
// ================================================================

fn recorder(trace: &Arc<Mutex<Vec<String>>>, label: &'static str) -> PipeDecl {
    let trace = Arc::clone(trace);
    PipeDecl::event("reload", move |caller, _| {
        trace.lock().unwrap().push(format!("{label}<-{caller}"));
        Ok(())
    })
}

#[test]
fn invoke_reaches_only_enabled_owners() {
    let (reg, _) = registry(&["a", "b", "admin"]);
    let trace = Arc::new(Mutex::new(Vec::new()));
    reg.declare(&id("a"), recorder(&trace, "a")).unwrap();
    reg.declare(&id("b"), recorder(&trace, "b")).unwrap();
    enable(&reg, "a");

    assert_eq!(reg.invoke("reload", &id("admin"), &[]), 1);
    assert_eq!(*trace.lock().unwrap(), vec!["a<-admin"]);
}

#[test]
fn invoke_honours_caller_allow_list() {
    let (reg, logger) = registry(&["a", "admin", "guest"]);
    let trace = Arc::new(Mutex::new(Vec::new()));
    reg.declare(&id("a"), recorder(&trace, "a").allow_callers([id("admin")]))
        .unwrap();
    enable(&reg, "a");

    assert_eq!(reg.invoke("reload", &id("guest"), &[]), 0);
    assert_eq!(reg.invoke("reload", &id("admin"), &[]), 1);
    assert_eq!(*trace.lock().unwrap(), vec!["a<-admin"]);
    assert!(logger.contains(Severity::Debug, "guest"));
}

#[test]
fn failing_event_handler_does_not_stop_delivery() {
    let (reg, logger) = registry(&["a", "b", "caller"]);
    let trace = Arc::new(Mutex::new(Vec::new()));
    reg.declare(&id("a"), PipeDecl::event("reload", |_, _| anyhow::bail!("config missing")))
        .unwrap();
    reg.declare(&id("b"), recorder(&trace, "b")).unwrap();
    enable(&reg, "a");
    enable(&reg, "b");

    assert_eq!(reg.invoke("reload", &id("caller"), &[]), 2);
    assert_eq!(*trace.lock().unwrap(), vec!["b<-caller"]);
    assert!(logger.contains(Severity::Error, "config missing"));
}

// ================================================================
// Failing resolution
// ================================================================

#[test]
fn panicking_getter_fails_the_link_without_unwinding() {
    let (reg, logger) = registry(&["a", "b"]);
    reg.declare(&id("a"), PipeDecl::property("motd", ValueType::Text, || panic!("motd file gone")))
        .unwrap();
    let slot = Slot::value("motd", ValueType::Text);

    let result = reg.link(&id("b"), &slot, &id("a"), "motd");

    assert!(matches!(result, Err(PipeError::Callback { ref pipe, .. }) if pipe == "motd"));
    assert!(!slot.is_linked());
    assert!(reg.links_of(&id("b")).is_empty());
    assert!(logger.contains(Severity::Error, "motd file gone"));
    assert!(matches!(reg.read(&id("a"), "motd"), Err(PipeError::Callback { .. })));
}

#[test]
fn target_disposed_during_read_is_logged_as_stale() {
    let logger = Arc::new(RecordingLogger::new());
    let reg = Arc::new(PipeRegistry::new(logger.clone()));
    for raw in ["a", "b"] {
        reg.attach(&Plugin::new(id(raw))).unwrap();
    }
    let inner = Arc::clone(&reg);
    reg.declare(
        &id("a"),
        PipeDecl::property("uptime", ValueType::Int, move || {
            inner.dispose(&id("a"));
            PipeValue::Int(1)
        }),
    )
    .unwrap();
    let slot = Slot::value("uptime", ValueType::Int);

    let result = reg.link(&id("b"), &slot, &id("a"), "uptime");

    assert_eq!(result, Err(PipeError::StaleRef));
    assert!(!slot.is_linked());
    assert!(logger.contains(Severity::Error, "uptime"));
}
