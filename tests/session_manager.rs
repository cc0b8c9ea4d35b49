mod common;

use common::{client, gateway, Call, MockTransport};
use ssh_ops::ssh::{Route, SessionManager};
use ssh_ops::{ClientError, Credential, Endpoint};

fn password() -> Credential {
    Credential::Password {
        user: "deploy".into(),
        password: "secret".into(),
    }
}

fn manager() -> (SessionManager<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    (SessionManager::new(transport.clone(), Some(gateway())), transport)
}

#[test]
fn connect_without_credential_is_a_usage_error() {
    let (mut sessions, transport) = manager();

    assert!(matches!(sessions.connect_direct("web01"), Err(ClientError::AuthConfig)));
    assert!(matches!(sessions.connect_via_tunnel("db01"), Err(ClientError::AuthConfig)));
    assert!(transport.calls().is_empty());
    assert!(sessions.route().is_none());
}

#[test]
fn direct_connect_sets_route_and_uses_standard_port() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());

    sessions.connect_direct("web01").unwrap();

    assert_eq!(sessions.route(), Some(&Route::Direct { host: "web01".into() }));
    assert_eq!(
        transport.calls(),
        vec![Call::Connect {
            id: 1,
            address: Endpoint::ssh("web01"),
            host_key_name: Endpoint::ssh("web01"),
            user: "deploy".into(),
        }]
    );
    assert_eq!(sessions.active_session().unwrap().id, 1);
}

#[test]
fn failed_direct_connect_leaves_no_handle() {
    let (mut sessions, transport) = manager();
    transport.world.borrow_mut().unreachable.insert("web01".into());
    sessions.authenticate(password());

    let err = sessions.connect_direct("web01").unwrap_err();

    assert!(matches!(err, ClientError::Connect { ref endpoint, .. } if *endpoint == Endpoint::ssh("web01")));
    assert!(sessions.primary().is_none());
    assert!(sessions.route().is_none());
    assert!(matches!(sessions.active_session(), Err(ClientError::NotConnected)));
}

#[test]
fn second_direct_connect_reuses_the_session() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());

    sessions.connect_direct("web01").unwrap();
    sessions.connect_direct("web01").unwrap();

    assert_eq!(transport.connects(), 1);
    assert_eq!(sessions.active_session().unwrap().id, 1);
}

#[test]
fn direct_connect_to_another_host_replaces_the_session() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());

    sessions.connect_direct("web01").unwrap();
    sessions.connect_direct("web02").unwrap();

    assert_eq!(transport.count(&Call::Disconnect { id: 1 }), 1);
    assert_eq!(sessions.active_session().unwrap().id, 2);
    assert_eq!(sessions.route().unwrap().host(), "web02");
}

#[test]
fn tunnel_connects_gateway_then_forward_then_target() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());

    sessions.connect_via_tunnel("db01").unwrap();

    assert_eq!(
        transport.calls(),
        vec![
            Call::Connect {
                id: 1,
                address: Endpoint::ssh("jump.example.org"),
                host_key_name: Endpoint::ssh("jump.example.org"),
                user: "ops".into(),
            },
            Call::Forward {
                id: 1,
                local_port: 2223,
                target: Endpoint::ssh("db01"),
            },
            Call::Connect {
                id: 2,
                address: Endpoint::new("localhost", 2223),
                host_key_name: Endpoint::ssh("db01"),
                user: "deploy".into(),
            },
        ]
    );
    assert_eq!(sessions.route(), Some(&Route::Tunneled { host: "db01".into() }));
    assert_eq!(sessions.active_session().unwrap().id, 2);
    assert_eq!(sessions.primary().unwrap().endpoint(), &Endpoint::ssh("jump.example.org"));
}

#[test]
fn gateway_failure_never_attempts_the_target() {
    let (mut sessions, transport) = manager();
    transport.world.borrow_mut().unreachable.insert("jump.example.org".into());
    sessions.authenticate(password());

    let err = sessions.connect_via_tunnel("db01").unwrap_err();

    assert!(matches!(err, ClientError::Connect { .. }));
    assert_eq!(transport.connects(), 1);
    assert!(!transport.calls().iter().any(|call| matches!(call, Call::Forward { .. })));
    assert!(sessions.primary().is_none());
    assert!(sessions.secondary().is_none());
}

#[test]
fn forward_failure_releases_the_gateway() {
    let (mut sessions, transport) = manager();
    transport.world.borrow_mut().fail_forward = true;
    sessions.authenticate(password());

    assert!(sessions.connect_via_tunnel("db01").is_err());

    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.count(&Call::Disconnect { id: 1 }), 1);
    assert!(sessions.route().is_none());
}

#[test]
fn target_failure_releases_the_gateway() {
    let (mut sessions, transport) = manager();
    transport.world.borrow_mut().unreachable.insert("localhost".into());
    sessions.authenticate(password());

    let err = sessions.connect_via_tunnel("db01").unwrap_err();

    assert!(matches!(err, ClientError::Connect { ref endpoint, .. } if endpoint.host == "db01"));
    assert_eq!(transport.count(&Call::Disconnect { id: 1 }), 1);
    assert!(sessions.primary().is_none());
}

#[test]
fn tunnel_is_reused_for_the_same_host() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());

    sessions.connect_via_tunnel("db01").unwrap();
    sessions.connect_via_tunnel("db01").unwrap();

    assert_eq!(transport.connects(), 2);
}

#[test]
fn tunnel_to_a_different_host_requires_close() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());
    sessions.connect_via_tunnel("db01").unwrap();

    let err = sessions.connect_via_tunnel("db02").unwrap_err();
    assert!(matches!(
        err,
        ClientError::TunnelTargetChanged { ref current, ref requested } if current == "db01" && requested == "db02"
    ));
    assert_eq!(sessions.route().unwrap().host(), "db01");

    sessions.close_all();
    sessions.connect_via_tunnel("db02").unwrap();
    assert_eq!(transport.connects(), 4);
    assert_eq!(sessions.route().unwrap().host(), "db02");
}

#[test]
fn tunnel_without_gateway_is_rejected() {
    let transport = MockTransport::new();
    let mut sessions = SessionManager::new(transport.clone(), None);
    sessions.authenticate(password());

    assert!(matches!(sessions.connect_via_tunnel("db01"), Err(ClientError::MissingGateway)));
    assert!(transport.calls().is_empty());
}

#[test]
fn switching_from_direct_to_tunnel_closes_the_direct_session() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());

    sessions.connect_direct("web01").unwrap();
    sessions.connect_via_tunnel("db01").unwrap();

    assert_eq!(transport.count(&Call::Disconnect { id: 1 }), 1);
    assert_eq!(sessions.active_session().unwrap().id, 3);
    assert_eq!(sessions.route(), Some(&Route::Tunneled { host: "db01".into() }));
}

#[test]
fn direct_connect_while_tunneled_keeps_the_tunnel() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());
    sessions.connect_via_tunnel("db01").unwrap();

    for host in ["db01", "web01"] {
        let err = sessions.connect_direct(host).unwrap_err();
        assert!(matches!(
            err,
            ClientError::TunnelOpen { ref current, ref requested } if current == "db01" && requested == host
        ));
    }

    assert_eq!(transport.connects(), 2);
    assert!(!transport.calls().iter().any(|call| matches!(call, Call::Disconnect { .. })));
    assert_eq!(sessions.route(), Some(&Route::Tunneled { host: "db01".into() }));
    assert_eq!(sessions.active_session().unwrap().id, 2);

    sessions.close_all();
    sessions.connect_direct("web01").unwrap();
    let calls = transport.calls();
    let closed: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            Call::Disconnect { id } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(closed, vec![2, 1]);
    assert_eq!(sessions.route(), Some(&Route::Direct { host: "web01".into() }));
    assert_eq!(sessions.active_session().unwrap().id, 3);
}

#[test]
fn switching_credentials_applies_to_the_next_connect() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());
    sessions.authenticate(Credential::Agent { user: "admin".into() });

    sessions.connect_direct("web01").unwrap();

    assert!(matches!(&transport.calls()[0], Call::Connect { user, .. } if user == "admin"));
    assert_eq!(sessions.credential(), Some(&Credential::Agent { user: "admin".into() }));
}

#[test]
fn close_all_disconnects_secondary_before_primary() {
    let (mut sessions, transport) = manager();
    sessions.authenticate(password());
    sessions.connect_via_tunnel("db01").unwrap();

    sessions.close_all();
    sessions.close_all();

    let calls = transport.calls();
    assert_eq!(&calls[calls.len() - 2..], &[Call::Disconnect { id: 2 }, Call::Disconnect { id: 1 }]);
    assert!(sessions.primary().is_none());
    assert!(sessions.secondary().is_none());
    assert!(matches!(sessions.active_session(), Err(ClientError::NotConnected)));
}

#[test]
fn dropping_the_client_closes_its_sessions() {
    let (mut client, transport, _) = client();
    client.authenticate_password("deploy", "secret");
    client.connect("web01").unwrap();

    drop(client);

    assert_eq!(transport.count(&Call::Disconnect { id: 1 }), 1);
}
