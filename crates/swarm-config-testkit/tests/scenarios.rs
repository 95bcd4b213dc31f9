//! Multi-device scenarios: concurrent edits, conflicts and convergence.

use std::sync::Arc;

use proptest::prelude::*;
use swarm_config::{ConfigMessage, Contact, Namespace};
use swarm_config_merge::{
    verify_convergence, ConfigObject, ManualClock, MergeOutcome, StampNode, ERASED,
};
use swarm_config_testkit::fixtures::{account_devices, contact_id, init_tracing, Device, EPOCH_MS};
use swarm_config_testkit::generators::edit_script;

fn profile_at(now_ms: u64) -> ConfigObject {
    ConfigObject::new(Namespace::UserProfile, None)
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(now_ms)))
}

/// Push and wrap as the message the swarm would hand back.
fn stored(obj: &mut ConfigObject, hash: &str, timestamp_ms: u64) -> ConfigMessage {
    let push = obj.push().unwrap().expect("nothing to push");
    assert!(obj.confirm_pushed(push.seqno, hash, timestamp_ms));
    ConfigMessage::new(obj.namespace(), hash, timestamp_ms, push.data)
}

fn exchange(devices: &mut [Device]) -> Vec<ConfigMessage> {
    let mut messages = Vec::new();
    for (i, device) in devices.iter_mut().enumerate() {
        messages.extend(device.publish(&format!("d{i}")).unwrap());
    }
    for (i, device) in devices.iter_mut().enumerate() {
        let mut inbox = messages.clone();
        if i % 2 == 1 {
            inbox.reverse();
        }
        let report = device.receive(&inbox).unwrap();
        assert!(report.rejected.is_empty(), "{:?}", report.rejected);
    }
    messages
}

fn assert_converged(devices: &[Device], namespace: Namespace) {
    let first = devices[0].state.config(namespace, None).unwrap();
    for other in &devices[1..] {
        let result = verify_convergence(first, other.state.config(namespace, None).unwrap());
        assert!(result.is_converged(), "{namespace}: {result:?}");
    }
}

#[test]
fn test_later_name_wins_and_matching_input_needs_no_push() {
    let mut alice = profile_at(100);
    let mut bob = profile_at(200);
    alice.field(b"n").set_nonempty_str("Alice").unwrap();
    bob.field(b"n").set_nonempty_str("Bob").unwrap();
    let from_alice = stored(&mut alice, "a", 100);
    let from_bob = stored(&mut bob, "b", 200);

    let mut fresh = profile_at(300);
    let result = fresh.merge(&[from_alice.clone(), from_bob.clone()]);
    assert_eq!(result.outcome(), MergeOutcome::Complete);
    assert_eq!(fresh.view(b"n").string(), Some("Bob"));
    assert!(!fresh.needs_push());

    // Alice's own device ends up with Bob's name and nothing new to push.
    alice.merge(&[from_alice, from_bob]);
    assert_eq!(alice.view(b"n").string(), Some("Bob"));
    assert!(!alice.needs_push());
    assert!(verify_convergence(&alice, &fresh).is_converged());
}

#[test]
fn test_unpushed_local_change_survives_empty_merge() {
    let mut carol = profile_at(100);
    carol.field(b"n").set_nonempty_str("Carol").unwrap();
    let seqno = carol.seqno();
    let before = carol.dump();

    let result = carol.merge(&[]);
    assert_eq!(result.outcome(), MergeOutcome::Empty);
    assert!(carol.needs_push());
    assert_eq!(carol.seqno(), seqno);
    assert_eq!(carol.view(b"n").string(), Some("Carol"));
    assert_eq!(carol.dump(), before);
}

#[test]
fn test_contact_edits_on_two_devices_combine() {
    init_tracing();
    let mut devices = account_devices([7; 32], 2).unwrap();
    let joe = contact_id(1);

    devices[0]
        .state
        .mutate_contacts(|c| c.set_name(&joe, "Joe"))
        .unwrap();
    devices[1].advance(1_000);
    devices[1]
        .state
        .mutate_contacts(|c| c.set_blocked(&joe, true))
        .unwrap();

    exchange(&mut devices);
    for device in &devices {
        let contact = device.state.contacts().get(&joe).unwrap().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Joe"));
        assert!(contact.blocked);
        // Neither input holds the combined contact, so both re-push it.
        assert!(device
            .state
            .config(Namespace::Contacts, None)
            .unwrap()
            .needs_push());
    }
    assert_converged(&devices, Namespace::Contacts);

    // A second round settles everything.
    exchange(&mut devices);
    for device in &devices {
        let contacts = device.state.config(Namespace::Contacts, None).unwrap();
        assert!(!contacts.needs_push());
    }
    assert_converged(&devices, Namespace::Contacts);
}

#[test]
fn test_same_contact_field_later_write_wins() {
    let mut devices = account_devices([8; 32], 2).unwrap();
    let joe = contact_id(1);
    devices[0].advance(20);
    devices[0]
        .state
        .mutate_contacts(|c| c.set_nickname(&joe, "Later"))
        .unwrap();
    devices[1].advance(10);
    devices[1]
        .state
        .mutate_contacts(|c| c.set_nickname(&joe, "Earlier"))
        .unwrap();

    exchange(&mut devices);
    for device in &devices {
        let contact = device.state.contacts().get(&joe).unwrap().unwrap();
        assert_eq!(contact.nickname.as_deref(), Some("Later"));
    }
    assert_converged(&devices, Namespace::Contacts);
}

/// Two devices that share contact `joe`, then: device 1 erases it at +50
/// while device 0 approves it at `approve_at`.
fn erase_against_approval(seed: u8, approve_at: u64) -> (Vec<Device>, String) {
    let mut devices = account_devices([seed; 32], 2).unwrap();
    let joe = contact_id(2);
    devices[0]
        .state
        .mutate_contacts(|c| c.set_name(&joe, "Joe"))
        .unwrap();
    exchange(&mut devices);

    devices[1].advance(50);
    devices[1]
        .state
        .mutate_contacts(|c| c.erase(&joe))
        .unwrap();
    devices[0].advance(approve_at);
    devices[0]
        .state
        .mutate_contacts(|c| c.set_approved(&joe, true))
        .unwrap();

    exchange(&mut devices);
    (devices, joe)
}

#[test]
fn test_erase_beats_older_edit_to_other_field() {
    let (devices, joe) = erase_against_approval(9, 10);
    for device in &devices {
        assert_eq!(device.state.contacts().get(&joe).unwrap(), None);
        assert!(device.state.contacts().is_empty());
    }
    assert_converged(&devices, Namespace::Contacts);
}

#[test]
fn test_edit_newer_than_erase_recreates_partial_entry() {
    let (devices, joe) = erase_against_approval(12, 100);
    for device in &devices {
        let contact = device.state.contacts().get(&joe).unwrap().unwrap();
        // The name went with the erase; only the later approval survives.
        assert_eq!(contact.name, None);
        assert!(contact.approved);
    }
    assert_converged(&devices, Namespace::Contacts);
}

#[test]
fn test_erased_contacts_leave_one_stamp_each() {
    let mut devices = account_devices([13; 32], 1).unwrap();
    let device = &mut devices[0];
    device
        .state
        .mutate_contacts(|c| {
            for n in 0..20u8 {
                c.set_name(&contact_id(n), "Someone")?;
                c.set_approved(&contact_id(n), true)?;
                c.set_blocked(&contact_id(n), true)?;
            }
            Ok(())
        })
        .unwrap();
    device.publish("add").unwrap();
    device
        .state
        .mutate_contacts(|c| {
            for n in 0..20u8 {
                c.erase(&contact_id(n))?;
            }
            Ok(())
        })
        .unwrap();

    let contacts = device.state.config(Namespace::Contacts, None).unwrap();
    let entries = contacts
        .stamps()
        .get(b"c".as_slice())
        .and_then(StampNode::as_branch)
        .unwrap();
    assert_eq!(entries.len(), 20);
    for entry in entries.values() {
        let branch = entry.as_branch().unwrap();
        assert_eq!(branch.keys().collect::<Vec<_>>(), vec![&ERASED.to_vec()]);
    }
}

#[test]
fn test_large_contact_list_is_compressed() {
    let mut devices = account_devices([10; 32], 2).unwrap();
    devices[0]
        .state
        .mutate_contacts(|c| {
            for n in 0..=255u8 {
                let mut contact = Contact::new(contact_id(n).parse()?);
                contact.name = Some(format!("Contact number {n}"));
                contact.approved = true;
                contact.created = 1_700_000_000;
                c.set(&contact)?;
            }
            Ok(())
        })
        .unwrap();

    let pushes = devices[0].take_pushes();
    let data = &pushes.last().unwrap().messages[0].data;
    assert_eq!(data[0], b'z');

    let message = ConfigMessage::new(Namespace::Contacts, "big", EPOCH_MS, data.clone());
    let report = devices[1].receive(&[message]).unwrap();
    assert_eq!(report.outcome(), MergeOutcome::Complete);
    assert_eq!(devices[1].state.contacts().len(), 256);
    let c = devices[1].state.contacts().get(&contact_id(42)).unwrap().unwrap();
    assert_eq!(c.name.as_deref(), Some("Contact number 42"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_devices_converge_after_exchange(script in edit_script(3, 12)) {
        let mut devices = account_devices([11; 32], 3).unwrap();
        for (step, (index, edit)) in script.iter().enumerate() {
            let device = &mut devices[*index];
            device.clock.set(EPOCH_MS + step as u64 * 10);
            device.state.mutate_user_profile(|p| edit.apply(p)).unwrap();
        }

        exchange(&mut devices);
        let first = devices[0].state.config(Namespace::UserProfile, None).unwrap();
        for other in &devices[1..] {
            let other = other.state.config(Namespace::UserProfile, None).unwrap();
            prop_assert!(verify_convergence(first, other).is_converged());
        }
    }
}
