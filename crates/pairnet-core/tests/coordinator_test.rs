//! Coordinator scenario tests

use pairnet_core::{
    ConnectionKind, Coordinator, CoordinatorConfig, Device, DeviceDirectory, DeviceLocation,
    Identifier, MemoryDirectory, MergeRejection, PairingError, PairingEvent, Queue, RegionId,
    RequestOutcome, Role, RoleSlot, RotatingLands, SessionJoin, SessionMode, StatusMessage,
};

struct World {
    coordinator: Coordinator,
    devices: MemoryDirectory,
    placed: i32,
}

impl World {
    fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    fn with_config(config: CoordinatorConfig) -> Self {
        Self { coordinator: Coordinator::new(config), devices: MemoryDirectory::new(), placed: 0 }
    }

    /// Issue a player and give them a device in the overworld.
    fn player(&mut self, name: &str) -> (Identifier, DeviceLocation) {
        let id = self.coordinator.identify(&format!("uuid-{name}"), name);
        self.placed += 1;
        let location = DeviceLocation::new(RegionId::new("overworld"), self.placed * 16, 64, 0);
        self.devices.place(location.clone(), Device::new(id));
        (id, location)
    }

    fn request(
        &mut self,
        player: Identifier,
        location: &DeviceLocation,
        other: Option<Identifier>,
        role: Role,
    ) -> RequestOutcome {
        self.coordinator.request_connection(&mut self.devices, player, location, other, role)
    }

    fn close(&mut self, player: Identifier, other: Option<Identifier>, role: Role) {
        self.coordinator.close_connection(&mut self.devices, player, other, role);
    }

    fn slot(&self, location: &DeviceLocation, role: Role) -> RoleSlot {
        self.devices.device(location).map(|d| d.slot(role).clone()).unwrap_or_default()
    }

    /// Link `client` to `server` through an open server.
    fn link(&mut self, client: (Identifier, &DeviceLocation), server: (Identifier, &DeviceLocation)) -> RequestOutcome {
        self.request(server.0, server.1, None, Role::Server);
        self.request(client.0, client.1, Some(server.0), Role::Client)
    }
}

#[test]
fn client_connects_to_open_server() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    let opened = world.request(alice, &alice_device, None, Role::Server);
    assert_eq!(opened, RequestOutcome::Waiting(Queue::OpenServers));
    assert!(world.coordinator.is_waiting(alice, Queue::OpenServers));
    assert!(world.slot(&alice_device, Role::Server).waiting);

    let joined = world.request(bob, &bob_device, Some(alice), Role::Client);
    assert_eq!(joined, RequestOutcome::Connected { kind: ConnectionKind::Regular, join: SessionJoin::Fresh });

    assert!(!world.coordinator.is_waiting(alice, Queue::OpenServers));
    assert!(!world.coordinator.is_waiting(bob, Queue::ResumingClients));
    assert_eq!(world.slot(&bob_device, Role::Client).connected_to, Some(alice));
    assert_eq!(world.slot(&alice_device, Role::Server).connected_to, Some(bob));
    assert!(!world.slot(&alice_device, Role::Server).waiting);

    let connection = world.coordinator.active_connection(bob);
    assert!(connection.is_some_and(|c| c.server() == Some(alice) && !c.is_main()));
}

#[test]
fn main_partner_resumes_without_target() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    world.link((bob, &bob_device), (alice, &alice_device));
    assert!(world.coordinator.give_items(&mut world.devices, bob));
    world.close(bob, Some(alice), Role::Client);
    assert!(world.coordinator.main_connection(bob, Role::Client).is_some_and(|c| !c.is_active()));

    world.request(alice, &alice_device, None, Role::Server);
    let resumed = world.request(bob, &bob_device, None, Role::Client);

    assert_eq!(resumed, RequestOutcome::Connected { kind: ConnectionKind::Resume, join: SessionJoin::Internal });
    assert_eq!(world.coordinator.associated_partner(bob, Role::Client), Some(alice));
    assert_eq!(world.coordinator.associated_partner(alice, Role::Server), Some(bob));
}

#[test]
fn client_waits_for_absent_main_partner() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    world.link((bob, &bob_device), (alice, &alice_device));
    world.coordinator.give_items(&mut world.devices, bob);
    world.close(bob, Some(alice), Role::Client);

    let waiting = world.request(bob, &bob_device, None, Role::Client);
    assert_eq!(waiting, RequestOutcome::Waiting(Queue::ResumingClients));
    assert!(world.slot(&bob_device, Role::Client).waiting);

    // The server side names its partner and picks the waiting client up.
    let resumed = world.request(alice, &alice_device, Some(bob), Role::Server);
    assert!(matches!(resumed, RequestOutcome::Connected { kind: ConnectionKind::Resume, .. }));
    assert!(!world.coordinator.is_waiting(bob, Queue::ResumingClients));
}

#[test]
fn server_resume_towards_stranger_is_rejected() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, _) = world.player("bob");

    let outcome = world.request(alice, &alice_device, Some(bob), Role::Server);
    assert_eq!(outcome, RequestOutcome::Rejected);
    assert!(!world.coordinator.is_waiting(alice, Queue::ResumingServers));
}

#[test]
fn busy_roles_are_rejected() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");

    world.request(alice, &alice_device, None, Role::Server);
    assert_eq!(world.request(alice, &alice_device, None, Role::Server), RequestOutcome::Rejected);
}

#[test]
fn excluded_region_and_foreign_device_are_rejected() {
    let mut world = World::new();
    let (alice, _) = world.player("alice");
    let (_, bob_device) = world.player("bob");

    let nether = DeviceLocation::new(RegionId::new("the_nether"), 0, 64, 0);
    world.devices.place(nether.clone(), Device::new(alice));

    assert_eq!(world.request(alice, &nether, None, Role::Server), RequestOutcome::Rejected);
    assert_eq!(world.request(alice, &bob_device, None, Role::Server), RequestOutcome::Rejected);
    assert!(world.coordinator.queue(Queue::OpenServers).is_empty());
}

#[test]
fn closing_open_server_twice_is_harmless() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");

    world.request(alice, &alice_device, None, Role::Server);
    world.close(alice, None, Role::Server);

    assert!(!world.coordinator.is_waiting(alice, Queue::OpenServers));
    let slot = world.slot(&alice_device, Role::Server);
    assert!(!slot.waiting);
    assert_eq!(slot.latest_message, Some(StatusMessage::ClosedServer));

    world.close(alice, None, Role::Server);
    assert!(world.coordinator.queue(Queue::OpenServers).is_empty());
}

#[test]
fn closing_secondary_connection_destroys_it() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    world.link((bob, &bob_device), (alice, &alice_device));
    world.coordinator.drain_events();
    world.close(bob, Some(alice), Role::Client);

    assert!(world.coordinator.connection(bob, alice).is_none());
    assert_eq!(world.slot(&bob_device, Role::Client).latest_message, Some(StatusMessage::Closed));
    assert_eq!(world.slot(&alice_device, Role::Server).connected_to, None);

    let closed = world
        .coordinator
        .drain_events()
        .into_iter()
        .any(|e| matches!(e, PairingEvent::ConnectionClosed { client, .. } if client == bob));
    assert!(closed);
}

#[test]
fn close_then_request_never_duplicates_pairs() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    for _ in 0..3 {
        world.link((bob, &bob_device), (alice, &alice_device));
        world.close(bob, Some(alice), Role::Client);
    }
    world.link((bob, &bob_device), (alice, &alice_device));

    let pairs = world
        .coordinator
        .connections()
        .filter(|c| c.client() == bob && c.server() == Some(alice))
        .count();
    assert_eq!(pairs, 1);
}

#[test]
fn closing_towards_main_partner_cancels_resume() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    world.link((bob, &bob_device), (alice, &alice_device));
    world.coordinator.give_items(&mut world.devices, bob);
    world.close(bob, Some(alice), Role::Client);

    let waiting = world.request(bob, &bob_device, None, Role::Client);
    assert_eq!(waiting, RequestOutcome::Waiting(Queue::ResumingClients));

    // The main connection is inactive, so closing towards alice only withdraws the resume.
    world.close(bob, Some(alice), Role::Client);

    assert!(!world.coordinator.is_waiting(bob, Queue::ResumingClients));
    let slot = world.slot(&bob_device, Role::Client);
    assert!(!slot.waiting);
    assert_eq!(slot.latest_message, Some(StatusMessage::StopResume));
    assert!(world.coordinator.main_connection(bob, Role::Client).is_some_and(|c| !c.is_active()));
}

#[test]
fn merge_rejection_rolls_back() {
    let config = CoordinatorConfig {
        global_session: false,
        max_session_players: 3,
        ..CoordinatorConfig::default()
    };
    let mut world = World::with_config(config);
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");
    let (carol, carol_device) = world.player("carol");
    let (dave, dave_device) = world.player("dave");

    world.link((alice, &alice_device), (bob, &bob_device));
    world.link((carol, &carol_device), (dave, &dave_device));
    assert_eq!(world.coordinator.roster().len(), 2);

    world.request(dave, &dave_device, None, Role::Server);
    let outcome = world.request(bob, &bob_device, Some(dave), Role::Client);

    let rejection = MergeRejection::SessionFull { players: 4, limit: 3 };
    assert_eq!(outcome, RequestOutcome::Denied(rejection));
    assert!(world.coordinator.connection(bob, dave).is_none());
    assert!(world.coordinator.is_waiting(dave, Queue::OpenServers));
    assert_eq!(
        world.slot(&bob_device, Role::Client).latest_message,
        Some(StatusMessage::Rejected(rejection))
    );
    assert_eq!(world.coordinator.roster().len(), 2);
}

#[test]
fn secondary_connection_copies_main_land() {
    let mut world = World::new();
    let mut lands = RotatingLands::default();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");
    let (carol, carol_device) = world.player("carol");

    world.link((bob, &bob_device), (alice, &alice_device));
    world.coordinator.give_items(&mut world.devices, bob);
    let land = world.coordinator.prepare_entry(&mut world.devices, &mut lands, bob);
    world.close(bob, Some(alice), Role::Client);

    let outcome = world.link((bob, &bob_device), (carol, &carol_device));
    assert!(matches!(outcome, RequestOutcome::Connected { kind: ConnectionKind::Secondary, .. }));

    let secondary = world.coordinator.connection(bob, carol);
    assert!(secondary.is_some_and(|c| !c.is_main()));
    assert_eq!(secondary.and_then(|c| c.land()).map(|l| l.dimension.clone()), land);

    // A secondary connection cannot be promoted while the main one exists.
    assert!(!world.coordinator.give_items(&mut world.devices, bob));
}

#[test]
fn prepare_entry_without_connection_creates_main() {
    let mut world = World::new();
    let mut lands = RotatingLands::default();
    let (alice, _) = world.player("alice");

    let land = world.coordinator.prepare_entry(&mut world.devices, &mut lands, alice);
    assert!(land.is_some());

    let main = world.coordinator.main_connection(alice, Role::Client);
    assert!(main.is_some_and(|c| !c.has_server()));
    assert!(world.coordinator.session_of(alice).is_some());

    // Preparing again returns the same land.
    assert_eq!(world.coordinator.prepare_entry(&mut world.devices, &mut lands, alice), land);

    assert!(world.coordinator.set_entry_center(alice, 100, -50));
    world.coordinator.on_entry(&mut world.devices, alice);

    let main = world.coordinator.main_connection(alice, Role::Client);
    assert!(main.is_some_and(|c| c.has_entered() && c.coordinate_override().is_none()));

    let dimension = land.unwrap_or_else(|| RegionId::new("missing"));
    assert!(world.coordinator.land_info_for_dimension(&dimension).is_some());
}

#[test]
fn prepare_entry_falls_back_to_independent_sessions() {
    let config = CoordinatorConfig { max_session_players: 2, ..CoordinatorConfig::default() };
    let mut world = World::with_config(config);
    let mut lands = RotatingLands::default();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");
    let (carol, _) = world.player("carol");

    world.link((alice, &alice_device), (bob, &bob_device));
    world.coordinator.give_items(&mut world.devices, alice);

    let land = world.coordinator.prepare_entry(&mut world.devices, &mut lands, carol);
    assert!(land.is_some());
    assert_eq!(world.coordinator.roster().mode(), SessionMode::Independent);
    assert_ne!(
        world.coordinator.session_of(carol).map(|s| s.id()),
        world.coordinator.session_of(alice).map(|s| s.id())
    );
}

#[test]
fn prepare_entry_gives_up_when_no_session_fits() {
    let config = CoordinatorConfig { max_session_players: 0, ..CoordinatorConfig::default() };
    let mut world = World::with_config(config);
    let mut lands = RotatingLands::default();
    let (alice, _) = world.player("alice");

    assert_eq!(world.coordinator.prepare_entry(&mut world.devices, &mut lands, alice), None);

    assert_eq!(world.coordinator.roster().mode(), SessionMode::Global);
    assert!(world.coordinator.roster().len() <= 1);
    assert!(world.coordinator.main_connection(alice, Role::Client).is_none());
    assert!(world.coordinator.connections().all(|c| c.client() != alice && c.server() != Some(alice)));
}

#[test]
fn prepare_entry_refuses_unpromotable_connection() {
    let mut world = World::new();
    let mut lands = RotatingLands::default();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");
    let (carol, carol_device) = world.player("carol");

    world.link((bob, &bob_device), (alice, &alice_device));
    assert!(world.coordinator.give_items(&mut world.devices, bob));

    // alice already serves bob as main, so carol's link to her stays regular.
    let outcome = world.link((carol, &carol_device), (alice, &alice_device));
    assert!(matches!(outcome, RequestOutcome::Connected { kind: ConnectionKind::Regular, .. }));

    assert_eq!(world.coordinator.prepare_entry(&mut world.devices, &mut lands, carol), None);

    assert!(world.coordinator.main_connection(carol, Role::Client).is_none());
    let connection = world.coordinator.connection(carol, alice);
    assert!(connection.is_some_and(|c| !c.is_main() && c.land().is_none()));
}

#[test]
fn entered_player_resumes_main_with_new_server() {
    let mut world = World::new();
    let mut lands = RotatingLands::default();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    world.coordinator.prepare_entry(&mut world.devices, &mut lands, alice);
    world.coordinator.on_entry(&mut world.devices, alice);
    world.coordinator.drain_events();

    let outcome = world.link((alice, &alice_device), (bob, &bob_device));
    assert!(matches!(outcome, RequestOutcome::Connected { kind: ConnectionKind::Resume, .. }));

    let main = world.coordinator.main_connection(alice, Role::Client);
    assert!(main.is_some_and(|c| c.server() == Some(bob) && c.is_active()));
    assert_eq!(world.coordinator.connections().count(), 1);

    let events = world.coordinator.drain_events();
    assert!(events.contains(&PairingEvent::LandChainsChanged));
}

#[test]
fn on_entry_without_main_connection_is_harmless() {
    let mut world = World::new();
    let (alice, _) = world.player("alice");

    world.coordinator.on_entry(&mut world.devices, alice);
    assert_eq!(world.coordinator.connections().count(), 0);
}

#[test]
fn checker_repairs_destroyed_devices() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");
    let (carol, carol_device) = world.player("carol");

    world.link((bob, &bob_device), (alice, &alice_device));
    world.request(carol, &carol_device, None, Role::Server);

    world.devices.remove(&alice_device);
    world.devices.remove(&carol_device);
    world.coordinator.check_data(&mut world.devices);

    assert!(world.coordinator.connection(bob, alice).is_none());
    assert!(!world.coordinator.is_waiting(carol, Queue::OpenServers));
    assert_eq!(world.slot(&bob_device, Role::Client).latest_message, Some(StatusMessage::Closed));

    let before = world.coordinator.snapshot();
    world.coordinator.check_data(&mut world.devices);
    assert_eq!(world.coordinator.snapshot(), before);
}

#[test]
fn disabled_checker_trusts_state() {
    let config = CoordinatorConfig { consistency_check: false, ..CoordinatorConfig::default() };
    let mut world = World::with_config(config);
    let (alice, alice_device) = world.player("alice");

    world.request(alice, &alice_device, None, Role::Server);
    world.devices.remove(&alice_device);
    world.coordinator.check_data(&mut world.devices);

    assert!(world.coordinator.is_waiting(alice, Queue::OpenServers));
}

#[test]
fn moving_device_follows_connection() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    world.link((bob, &bob_device), (alice, &alice_device));

    let moved = DeviceLocation::new(RegionId::new("overworld"), 999, 64, 999);
    assert!(world.devices.relocate(&alice_device, moved.clone()));
    let result = world.coordinator.moving_device(&alice_device, alice, &moved, alice);
    assert!(result.is_ok());

    // Closing from the moving side is suppressed for this tick.
    world.close(alice, Some(bob), Role::Server);
    assert!(world.coordinator.active_connection(bob).is_some());

    world.coordinator.clear_moving_list();
    world.coordinator.check_data(&mut world.devices);
    let connection = world.coordinator.active_connection(bob);
    assert!(connection.is_some_and(|c| c.server_device() == Some(&moved)));
    assert!(world.coordinator.server_connection(&moved).is_some());
}

#[test]
fn moving_device_between_owners_is_fatal() {
    let mut world = World::new();
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");

    let result = world.coordinator.moving_device(&alice_device, alice, &bob_device, bob);
    assert!(matches!(result, Err(ref e @ PairingError::OwnerMismatch { .. }) if e.is_fatal()));
}

#[test]
fn reset_given_items_clears_records() {
    let mut world = World::new();
    let mut lands = RotatingLands::default();
    let (alice, _) = world.player("alice");

    world.coordinator.prepare_entry(&mut world.devices, &mut lands, alice);
    assert!(world.coordinator.record_given_item(alice, "cruxtruder"));
    assert!(!world.coordinator.record_given_item(alice, "cruxtruder"));

    world.coordinator.reset_given_items();
    assert!(world.coordinator.record_given_item(alice, "cruxtruder"));
    assert!(world.coordinator.drain_events().contains(&PairingEvent::GivenItemsReset));
}

#[test]
fn record_round_trip_preserves_membership() {
    let config = CoordinatorConfig { global_session: false, ..CoordinatorConfig::default() };
    let mut world = World::with_config(config.clone());
    let (alice, alice_device) = world.player("alice");
    let (bob, bob_device) = world.player("bob");
    let (carol, carol_device) = world.player("carol");

    world.link((alice, &alice_device), (bob, &bob_device));
    world.coordinator.give_items(&mut world.devices, alice);
    world.request(carol, &carol_device, None, Role::Server);

    let bytes = pairnet_core::persist::encode(&world.coordinator.write()).ok();
    let record = bytes.and_then(|b| pairnet_core::persist::decode(&b).ok());
    let restored = record.map(|r| Coordinator::from_record(config, r));
    let Some(restored) = restored else { panic!("record did not round-trip") };

    for queue in Queue::ALL {
        assert_eq!(restored.queue(queue), world.coordinator.queue(queue));
    }
    assert_eq!(restored.roster().mode(), SessionMode::Independent);
    assert_eq!(restored.associated_partner(alice, Role::Client), Some(bob));
    assert_eq!(restored.session_of(bob).map(|s| s.len()), Some(1));
    assert_eq!(restored.identifiers().name(carol), Some("carol"));
}
