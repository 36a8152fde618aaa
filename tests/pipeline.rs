mod common;

use chatr_core::Interception;
use chatr_core::registry::{PermissionSet, PlayerSnapshot, SnapshotRegistry};
use common::*;
use std::time::Duration;

fn players() -> SnapshotRegistry {
    let registry = SnapshotRegistry::new();
    registry.publish(PlayerSnapshot::new(1, "Alice"));
    registry.publish(PlayerSnapshot::new(2, "Bob"));
    registry.publish(
        PlayerSnapshot::new(3, "Steve")
            .with_permissions(PermissionSet::new().grant("chatr.chat.color")),
    );
    registry.publish(
        PlayerSnapshot::new(4, "Mod").with_permissions(PermissionSet::new().grant("chatr.*")),
    );
    registry
}

#[test]
fn placeholder_keeps_signed_fields() {
    let host = Host::new(&config(""), players());
    let alice = host.connect(1, 1);
    let original = player_chat(2, "Hello {player}");
    host.send(1, &alice, original.clone());

    let received = alice.wait_for(1);
    assert_eq!(chat_text(&received[0]), "Hello Alice");

    let before = layout(&original);
    let after = layout(&received[0]);
    for field in ["sender", "index", "signature", "body", "timestamp", "salt", "previous_messages"] {
        assert_eq!(
            before.field(&original.data, field),
            after.field(&received[0].data, field),
            "{field} changed"
        );
    }
    assert_eq!(after.signature, before.signature);
    assert_eq!(after.timestamp, Some(1_700_000_000_000));
}

#[test]
fn each_recipient_sees_their_own_name() {
    let host = Host::new(&config(""), players());
    let alice = host.connect(1, 1);
    let bob = host.connect(2, 2);
    let message = system_chat(r#""Welcome, {player}!""#);
    host.send(1, &alice, message.clone());
    host.send(2, &bob, message);

    assert_eq!(chat_text(&alice.wait_for(1)[0]), "Welcome, Alice!");
    assert_eq!(chat_text(&bob.wait_for(1)[0]), "Welcome, Bob!");
}

#[test]
fn renders_once_per_recipient() {
    let host = Host::new(&config(""), players());
    // Alice is connected twice, both connections share one render
    let connections = [(1, 1), (2, 1), (3, 2)];
    let recorders: Vec<_> = connections
        .iter()
        .map(|&(connection, player)| host.connect(connection, player))
        .collect();
    let message = system_chat(r#""Hi {player}""#);
    for (&(connection, _), recorder) in connections.iter().zip(&recorders) {
        host.send(connection, recorder, message.clone());
    }
    for recorder in &recorders {
        recorder.wait_for(1);
    }
    assert!(host.pipeline.wait_idle(Duration::from_secs(5)));
    assert_eq!(host.pipeline.cache_stats().computations, 2);
    assert_eq!(chat_text(&recorders[0].wait_for(1)[0]), "Hi Alice");
    assert_eq!(chat_text(&recorders[1].wait_for(1)[0]), "Hi Alice");
    assert_eq!(chat_text(&recorders[2].wait_for(1)[0]), "Hi Bob");
}

#[test]
fn placeholder_values_are_not_styled() {
    let registry = players();
    registry.publish(PlayerSnapshot::new(5, "&cEve"));
    let host = Host::new(&config(r#"transformer_order = ["placeholder", "style"]"#), registry);
    let eve = host.connect(1, 5);
    host.send(1, &eve, player_chat(3, "&aHi {player}"));

    let received = eve.wait_for(1);
    assert_eq!(chat_text(&received[0]), "Hi &cEve");
    let json = match layout(&received[0]).content {
        chatr_network::chat::ChatContent::Component(text) => text.into_component(),
        other => panic!("expected rendered component, got {other:?}"),
    };
    assert_eq!(json.encode_json().unwrap(), r#"{"text":"Hi &cEve","color":"green"}"#);
}

#[test]
fn unprivileged_sender_cannot_style() {
    let host = Host::new(&config(""), players());
    let alice = host.connect(1, 1);
    let original = player_chat(2, "&cred?");
    host.send(1, &alice, original.clone());
    // Nothing changed, so the packet is delivered as sent
    assert_eq!(alice.wait_for(1)[0], original);
}

#[test]
fn filter_drops_per_recipient() {
    let config = config(
        r#"
filter_wordlist = ["darn"]
filter_action = "drop"
"#,
    );
    let host = Host::new(&config, players());
    let alice = host.connect(1, 1);
    let moderator = host.connect(2, 4);
    let message = player_chat(2, "oh darn");
    host.send(1, &alice, message.clone());
    host.send(1, &alice, other(0x10));
    host.send(2, &moderator, message.clone());

    // Alice only gets the packet that followed the message
    let received = alice.wait_for(1);
    assert!(host.pipeline.wait_idle(Duration::from_secs(5)));
    assert_eq!(received, vec![other(0x10)]);
    assert_eq!(alice.wait_for(1).len(), 1);
    assert_eq!(moderator.wait_for(1)[0], message);
}

#[test]
fn censoring() {
    let config = config(
        r#"
filter_wordlist = ["darn"]
filter_action = "censor"
"#,
    );
    let host = Host::new(&config, players());
    let alice = host.connect(1, 1);
    host.send(1, &alice, player_chat(2, "oh DARN it"));
    assert_eq!(chat_text(&alice.wait_for(1)[0]), "oh **** it");
}

#[test]
fn order_is_preserved() {
    let host = Host::new(&config(""), players());
    let alice = host.connect(1, 1);
    let sent = vec![
        other(0x01),
        system_chat(r#""first {player}""#),
        other(0x02),
        player_chat(2, "second {player}"),
        other(0x03),
        system_chat(r#""third""#),
        other(0x04),
    ];
    for packet in &sent {
        host.send(1, &alice, packet.clone());
    }

    let received = alice.wait_for(sent.len());
    let ids: Vec<i32> = received.iter().map(|p| p.id).collect();
    assert_eq!(ids, sent.iter().map(|p| p.id).collect::<Vec<_>>());
    assert_eq!(chat_text(&received[1]), "first Alice");
    assert_eq!(chat_text(&received[3]), "second Alice");
    assert_eq!(chat_text(&received[5]), "third");
    assert_eq!(received[6], other(0x04));
}

#[test]
fn oversized_render_falls_back_to_original() {
    let config = config(
        r#"
max_rendered_length = 12

[placeholders]
rules = "Be nice to everyone, no spam, no caps"
"#,
    );
    let host = Host::new(&config, players());
    let alice = host.connect(1, 1);
    let original = system_chat(r#""Rules: {rules}""#);
    host.send(1, &alice, original.clone());
    assert_eq!(alice.wait_for(1)[0], original);
}

#[test]
fn unsupported_protocol_passes_through() {
    let host = Host::new(&config(""), players());
    host.connect_with(1, 1, 765);
    let packet = system_chat(r#""{player}""#);
    assert_eq!(
        host.pipeline.intercept(1, packet.clone()),
        Interception::PassThrough(packet)
    );
}

#[test]
fn unknown_connection_passes_through() {
    let host = Host::new(&config(""), players());
    let packet = system_chat(r#""hi""#);
    assert_eq!(
        host.pipeline.intercept(42, packet.clone()),
        Interception::PassThrough(packet)
    );
}

#[test]
fn untouchable_components_pass_through() {
    let host = Host::new(&config(""), players());
    let _alice = host.connect(1, 1);
    let translated = system_chat(r#"{"translate":"multiplayer.player.joined","with":["Bob"]}"#);
    assert_eq!(
        host.pipeline.intercept(1, translated.clone()),
        Interception::PassThrough(translated)
    );
}

#[test]
fn rate_limited_sender() {
    let config = config(
        r#"
transformer_order = ["rate_limit", "placeholder"]
rate_limit_messages = 1
render_threads = 1
"#,
    );
    let host = Host::new(&config, players());
    let alice = host.connect(1, 1);
    host.send(1, &alice, player_chat(2, "one"));
    host.send(1, &alice, player_chat(2, "two"));
    host.send(1, &alice, other(0x05));
    host.send(1, &alice, player_chat(4, "mods may spam"));

    let received = alice.wait_for(3);
    assert!(host.pipeline.wait_idle(Duration::from_secs(5)));
    assert_eq!(alice.wait_for(3).len(), 3);
    assert_eq!(chat_text(&received[0]), "one");
    assert_eq!(received[1], other(0x05));
    assert_eq!(chat_text(&received[2]), "mods may spam");
}

#[test]
fn shutdown_delivers_pending_messages() {
    let host = Host::new(&config(""), players());
    let alice = host.connect(1, 1);
    for i in 0..20 {
        host.send(1, &alice, system_chat(&format!(r#""message {i} for {{player}}""#)));
    }
    host.pipeline.shutdown(Duration::from_secs(5));
    assert_eq!(alice.wait_for(20).len(), 20);
}

#[test]
fn huge_expansion_falls_back_to_original() {
    let config = config(&format!("[placeholders]\nspam = \"{}\"\n", "x".repeat(10_000)));
    let host = Host::new(&config, players());
    let alice = host.connect(1, 1);
    let original = player_chat(2, "look: {spam}");
    host.send(1, &alice, original.clone());
    assert_eq!(alice.wait_for(1)[0], original);
}

#[test]
fn repeated_message_is_rendered_again() {
    let registry = SnapshotRegistry::new();
    registry.publish(PlayerSnapshot::new(1, "Alice"));
    registry.publish(PlayerSnapshot::new(2, "Bob"));
    let host = Host::new(&config(""), registry);
    let alice = host.connect(1, 1);
    let _bob = host.connect(2, 2);

    let message = system_chat(r#""{online} online""#);
    host.send(1, &alice, message.clone());
    assert_eq!(chat_text(&alice.wait_for(1)[0]), "2 online");

    host.registry.publish(PlayerSnapshot::new(3, "Carol"));
    host.send(1, &alice, message);
    assert_eq!(chat_text(&alice.wait_for(2)[1]), "3 online");
}

/// Sends every chat packet kind of `protocol` to Alice and checks that each
/// is rendered and delivered in order.
fn renders_all_chat_kinds(protocol: i32, system: i32, player: i32, disguised: i32) {
    let host = Host::new(&config(""), players());
    let alice = host.connect_with(1, 1, protocol);
    let sent = vec![
        with_id(system_chat(r#""system for {player}""#), system),
        other(0x02),
        with_id(player_chat(2, "player for {player}"), player),
        with_id(disguised_chat(disguised, r#""disguised for {player}""#), disguised),
    ];
    for packet in &sent {
        host.send(1, &alice, packet.clone());
    }

    let received = alice.wait_for(sent.len());
    let ids: Vec<i32> = received.iter().map(|p| p.id).collect();
    assert_eq!(ids, [system, 0x02, player, disguised]);
    assert_eq!(chat_text_for(protocol, &received[0]), "system for Alice");
    assert_eq!(received[1], other(0x02));
    assert_eq!(chat_text_for(protocol, &received[2]), "player for Alice");
    assert_eq!(chat_text_for(protocol, &received[3]), "disguised for Alice");
    let signed = layout_for(protocol, &received[2]);
    assert_eq!(signed.signature, layout_for(protocol, &sent[2]).signature);
}

#[test]
fn renders_chat_kinds_of_1_19_3() {
    renders_all_chat_kinds(761, 0x60, 0x31, 0x18);
}

#[test]
fn renders_chat_kinds_of_1_20_2() {
    renders_all_chat_kinds(764, 0x67, 0x37, 0x1B);
}
