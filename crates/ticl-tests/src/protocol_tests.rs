//! End-to-end protocol behavior: quiet periods, header invariants, and
//! inbound filtering.

use ticl::ClientErrorType;
use ticl::Scheduler;
use ticl_proto::{ConfigChangeMessage, Invalidation, ObjectId, ProtocolVersion};

use crate::harness::{invalidation_message, server_header, TestClient};

fn oid(name: &[u8]) -> ObjectId {
    ObjectId::new(4, name.to_vec())
}

mod quiet_period {
    use super::*;
    use ticl_proto::ServerToClientMessage;

    fn config_change(token: &[u8], delay_ms: i64, time_ms: i64) -> ServerToClientMessage {
        let mut message = ServerToClientMessage::with_header(server_header(token, time_ms));
        message.config_change_message = Some(ConfigChangeMessage {
            next_message_delay_ms: Some(delay_ms),
        });
        message
    }

    #[test]
    fn test_quiet_period_defers_batched_send() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");
        t.take_sent();

        t.scheduler.advance_to(10_000);
        t.network.deliver(&config_change(b"T", 5000, 9000));
        t.scheduler.run_due();
        assert_eq!(t.client.next_message_send_time_ms(), 15_000);

        // The application registers during the quiet period; the
        // batching task fires at ~11.5 s but must not send.
        t.scheduler.advance_to(11_000);
        t.client.register(oid(b"obj"));
        t.scheduler.advance_to(12_000);
        assert_eq!(t.network.sent_count(), 0);

        // After the quiet period ends, the next flush carries the
        // retained registration.
        t.scheduler.advance_to(15_001);
        t.client.register(oid(b"obj"));
        t.scheduler.advance_to(15_700);

        let sent = t.take_sent();
        assert_eq!(sent.len(), 1);
        let registrations = &sent[0].registration_message.as_ref().unwrap().registrations;
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].object_id, oid(b"obj"));
    }

    #[test]
    fn test_config_change_suppresses_rest_of_envelope() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        // An envelope carrying both a config change and an invalidation:
        // the quiet period is honored, the invalidation is dropped.
        let mut message = config_change(b"T", 4000, 5000);
        message.invalidation_message = Some(ticl_proto::InvalidationMessage {
            invalidations: vec![Invalidation::new(oid(b"x"), 1)],
        });
        t.network.deliver(&message);
        t.scheduler.run_due();

        assert!(t.listener.events().is_empty());
        assert!(t.client.next_message_send_time_ms() > 0);
    }

    #[test]
    fn test_config_change_accepted_despite_token_mismatch() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.network.deliver(&config_change(b"other-token", 4000, 5000));
        t.scheduler.run_due();
        assert_eq!(
            t.client.next_message_send_time_ms(),
            t.scheduler.now_ms() + 4000
        );
    }
}

mod outbound_invariants {
    use super::*;

    /// Every envelope without a client token carries an initialize
    /// message, and message ids strictly increase.
    #[test]
    fn test_header_invariants_across_session() {
        let t = TestClient::new(1000);
        t.client.start();
        t.scheduler.run_due();
        t.scheduler.advance_by(600);
        t.network
            .deliver(&crate::harness::token_control_message(b"1000", Some(b"T"), 1500));
        t.scheduler.run_due();

        t.client.register(oid(b"a"));
        t.scheduler.advance_by(600);
        t.client.register(oid(b"b"));
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        assert_eq!(sent.len(), 3);
        let mut last_id = 0;
        for envelope in &sent {
            assert!(envelope.header.message_id > last_id);
            last_id = envelope.header.message_id;
            if envelope.header.client_token.is_none() {
                assert!(envelope.initialize_message.is_some());
            }
        }
    }

    #[test]
    fn test_max_known_server_time_is_monotone() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");
        t.take_sent();

        t.network
            .deliver(&invalidation_message(b"T", vec![Invalidation::new(oid(b"x"), 1)], 9000));
        t.scheduler.run_due();
        t.client.register(oid(b"a"));
        t.scheduler.advance_by(600);

        // An older server timestamp must not move the envelope back.
        t.network
            .deliver(&invalidation_message(b"T", vec![Invalidation::new(oid(b"y"), 2)], 7000));
        t.scheduler.run_due();
        t.client.register(oid(b"b"));
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].header.max_known_server_time_ms, 9000);
        assert_eq!(sent[1].header.max_known_server_time_ms, 9000);
    }

    #[test]
    fn test_registration_summary_rides_every_envelope() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.client.register(oid(b"a"));
        t.scheduler.advance_by(600);

        let sent = t.take_sent();
        let summary = sent
            .last()
            .unwrap()
            .header
            .registration_summary
            .as_ref()
            .unwrap();
        assert_eq!(summary.num_registrations, 1);
        assert_eq!(summary.registration_digest.len(), 20);
    }
}

mod inbound_filtering {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_counted_and_dropped() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.network.deliver_raw(b"not a frame at all".to_vec());
        t.scheduler.run_due();

        assert!(t.listener.events().is_empty());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::IncomingMessageFailure),
            1
        );
    }

    #[test]
    fn test_wrong_major_version_is_dropped() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        let mut message =
            invalidation_message(b"T", vec![Invalidation::new(oid(b"x"), 1)], 5000);
        message.header.protocol_version =
            ProtocolVersion::new(ticl_proto::PROTOCOL_MAJOR_VERSION + 1, 0);
        t.network.deliver(&message);
        t.scheduler.run_due();

        assert!(t.listener.events().is_empty());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::ProtocolVersionFailure),
            1
        );
    }

    #[test]
    fn test_newer_minor_version_is_accepted() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        let mut message =
            invalidation_message(b"T", vec![Invalidation::new(oid(b"x"), 1)], 5000);
        message.header.protocol_version =
            ProtocolVersion::new(ticl_proto::PROTOCOL_MAJOR_VERSION, 9);
        t.network.deliver(&message);
        t.scheduler.run_due();

        assert_eq!(t.listener.events().len(), 1);
    }

    #[test]
    fn test_token_mismatch_drops_whole_envelope() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        t.network.deliver(&invalidation_message(
            b"imposter",
            vec![Invalidation::new(oid(b"x"), 1)],
            5000,
        ));
        t.scheduler.run_due();

        assert!(t.listener.events().is_empty());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::TokenMismatch),
            1
        );
    }

    #[test]
    fn test_structurally_invalid_message_is_dropped() {
        let t = TestClient::new(1000);
        t.start_with_token(b"T");

        // An over-long object name fails structural validation.
        let bad = Invalidation::new(ObjectId::new(4, vec![0u8; 65]), 1);
        t.network.deliver(&invalidation_message(b"T", vec![bad], 5000));
        t.scheduler.run_due();

        assert!(t.listener.events().is_empty());
        assert_eq!(
            t.client
                .statistics()
                .client_error_count(ClientErrorType::IncomingMessageFailure),
            1
        );
    }
}

mod fuzzing {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary bytes off the wire never panic the engine and never
        /// reach the listener.
        #[test]
        fn prop_random_bytes_are_dropped(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let t = TestClient::new(1000);
            t.start_with_token(b"T");

            t.network.deliver_raw(bytes);
            t.scheduler.run_due();

            prop_assert!(t.listener.events().is_empty());
        }
    }
}
