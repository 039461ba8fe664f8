//! Integration tests for `PermissionChain` voting.

use plinth_permissions::{FnHandler, PermissionChain, PermissionHandler, PlayerId, Vote};
use plinth_types::testing::RecordingLogger;
use plinth_types::PluginId;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn chain(defaults: &[&str]) -> PermissionChain {
    PermissionChain::new(defaults.iter().copied(), Arc::new(RecordingLogger::new()))
}

fn voter(name: &str, vote: Vote) -> Arc<dyn PermissionHandler> {
    Arc::new(FnHandler::new(name, move |_: &PlayerId, _: &str| vote))
}

fn plugin(raw: &str) -> PluginId {
    PluginId::new(raw).unwrap()
}

#[test]
fn deny_from_later_handler_beats_default_allow() {
    let chain = chain(&["admin.kick"]);
    let player = PlayerId::random();
    assert_eq!(chain.check(&player, "admin.kick"), Vote::Allow);

    chain.register(
        Some(plugin("moderation")),
        Arc::new(FnHandler::new("moderation", |_: &PlayerId, perm: &str| {
            if perm == "admin.kick" { Vote::Deny } else { Vote::Abstain }
        })),
    );

    assert_eq!(chain.check(&player, "admin.kick"), Vote::Deny);
}

#[test]
fn deny_short_circuits_remaining_handlers() {
    let chain = chain(&[]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    chain.register(None, voter("bans", Vote::Deny));
    chain.register(
        None,
        Arc::new(FnHandler::new("audit", move |_: &PlayerId, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Vote::Allow
        })),
    );

    assert_eq!(chain.check(&PlayerId::random(), "build"), Vote::Deny);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn last_vote_wins_without_a_deny() {
    let chain = chain(&["build"]);
    let player = PlayerId::random();
    chain.register(None, voter("quiet", Vote::Abstain));
    assert_eq!(chain.check(&player, "build"), Vote::Abstain);

    chain.register(None, voter("ranks", Vote::Allow));
    assert_eq!(chain.check(&player, "build"), Vote::Allow);
}

#[test]
fn unregister_owner_removes_only_that_plugins_handlers() {
    let chain = chain(&[]);
    let economy = plugin("economy");
    chain.register(Some(economy.clone()), voter("shop", Vote::Deny));
    chain.register(Some(economy.clone()), voter("bank", Vote::Deny));
    let keep = chain.register(Some(plugin("ranks")), voter("ranks", Vote::Allow)).id();

    assert_eq!(chain.unregister_owner(&economy), 2);
    assert_eq!(chain.handler_names(), vec!["default", "ranks"]);
    assert!(chain.unregister(keep));
    assert!(!chain.unregister(keep));
    assert_eq!(chain.check(&PlayerId::random(), "anything"), Vote::Abstain);
}

#[test]
fn same_handler_name_from_two_plugins_both_vote() {
    let chain = chain(&["admin.kick"]);
    let player = PlayerId::random();
    let (staff, moderation) = (plugin("staff"), plugin("moderation"));

    let first = chain.register(Some(staff.clone()), voter("ranks", Vote::Abstain));
    let second = chain.register(
        Some(moderation.clone()),
        Arc::new(FnHandler::new("ranks", |_: &PlayerId, perm: &str| {
            if perm == "admin.kick" { Vote::Deny } else { Vote::Abstain }
        })),
    );

    assert!(first.is_added() && second.is_added());
    assert_ne!(first.id(), second.id());
    assert_eq!(chain.handler_names(), vec!["default", "ranks", "ranks"]);
    assert_eq!(chain.check(&player, "admin.kick"), Vote::Deny);

    assert_eq!(chain.unregister_owner(&staff), 1);
    assert_eq!(chain.check(&player, "admin.kick"), Vote::Deny);
    assert_eq!(chain.unregister_owner(&moderation), 1);
    assert_eq!(chain.check(&player, "admin.kick"), Vote::Allow);
}
