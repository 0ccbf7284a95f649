use std::net::TcpListener;

use labnet_core::{catalog::StudentCode, testing, ConnectRequest, PipelineOpts};

use super::*;

fn daemon(opts: PipelineOpts) -> Daemon<testing::FakeController> {
    Daemon::new(Pipeline::new(testing::fabric(2), opts), testing::catalog())
}

fn ssh(student: StudentCode) -> Request {
    Request::Connect(
        ConnectRequest::builder()
            .student(student)
            .server("srv-ssh")
            .service("ssh")
            .build(),
    )
}

fn connected(response: Response) -> labnet_core::Connection {
    match response {
        Response::Connected(connection) => connection,
        other => panic!("expected a connection, got {other:?}"),
    }
}

fn failure_kind(response: Response) -> String {
    match response {
        Response::Failed { kind, .. } => kind,
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn connect_list_disconnect() {
    let daemon = daemon(PipelineOpts::default());
    let conn = connected(daemon.handle(ssh(testing::STUDENT)));
    assert_eq!(conn.flows.len(), 6);
    assert_eq!(
        daemon.handle(Request::List),
        Response::Connections(vec![conn.clone()])
    );

    let response = daemon.handle(Request::Disconnect {
        handler: conn.handler.to_string(),
    });
    assert_eq!(
        response,
        Response::Disconnected {
            handler: conn.handler,
            deleted: conn.flows,
        }
    );
    assert!(daemon.pipeline().controller().installed().is_empty());
    assert_eq!(daemon.handle(Request::List), Response::Connections(vec![]));
}

#[test]
fn failures_carry_their_kind() {
    let daemon = daemon(PipelineOpts::default());
    let denied = daemon.handle(Request::Connect(
        ConnectRequest::builder()
            .student(testing::STUDENT)
            .server("srv-ssh")
            .service("ftp")
            .build(),
    ));
    assert_eq!(failure_kind(denied), "authorization_denied");

    let malformed = daemon.handle(Request::Disconnect {
        handler: "not a handler".into(),
    });
    assert_eq!(failure_kind(malformed), "validation");

    let unknown = daemon.handle(Request::Disconnect {
        handler: "c99-zzzzzz".into(),
    });
    assert_eq!(failure_kind(unknown), "not_found");
}

#[test]
fn shutdown_cancels_pending_teardowns() {
    let daemon = daemon(PipelineOpts::default());
    let conn = connected(daemon.handle(ssh(testing::STUDENT)));
    daemon.shut_down();
    let response = daemon.handle(Request::Disconnect {
        handler: conn.handler.to_string(),
    });
    assert_eq!(failure_kind(response), "cancelled");
    assert_eq!(daemon.pipeline().list(), vec![conn]);
}

#[test]
fn reload_swaps_the_catalog() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("catalog.yaml");
    labnet_utils::write_catalog(&path, &testing::catalog())?;

    let daemon = Daemon::new(
        Pipeline::new(testing::fabric(2), PipelineOpts::default()),
        Catalog::default(),
    )
    .with_catalog_path(&path);
    assert_eq!(
        failure_kind(daemon.handle(ssh(testing::STUDENT))),
        "not_found"
    );

    let expected = testing::catalog();
    assert_eq!(
        daemon.handle(Request::Reload),
        Response::Reloaded {
            students: expected.students().len(),
            courses: expected.courses().len(),
            servers: expected.servers().len(),
        }
    );
    connected(daemon.handle(ssh(testing::STUDENT)));
    Ok(())
}

#[test]
fn failed_reload_keeps_the_old_catalog() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("catalog.yaml");
    std::fs::write(&path, "alumnos: [")?;

    let daemon = daemon(PipelineOpts::default()).with_catalog_path(&path);
    assert_eq!(failure_kind(daemon.handle(Request::Reload)), "reload");
    connected(daemon.handle(ssh(testing::STUDENT)));
    Ok(())
}

#[test]
fn reload_without_a_file_fails() {
    let daemon = daemon(PipelineOpts::default());
    assert_eq!(failure_kind(daemon.handle(Request::Reload)), "reload");
}

#[test]
fn reap_removes_expired_connections() {
    let opts = PipelineOpts::builder()
        .ttl(chrono::Duration::minutes(5))
        .build();
    let daemon = daemon(opts);
    let conn = connected(daemon.handle(ssh(testing::STUDENT)));
    let expires_at = conn.expires_at.unwrap();

    assert_eq!(daemon.reap(expires_at - chrono::Duration::seconds(1)), 0);
    assert_eq!(daemon.pipeline().list().len(), 1);
    assert_eq!(daemon.reap(expires_at + chrono::Duration::seconds(1)), 1);
    assert!(daemon.pipeline().list().is_empty());
    assert!(daemon.pipeline().controller().installed().is_empty());
}

#[test]
fn requests_are_served_over_tcp() -> anyhow::Result<()> {
    let daemon = Arc::new(daemon(PipelineOpts::default()));
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = {
        let daemon = Arc::clone(&daemon);
        thread::spawn(move || serve(daemon, listener))
    };

    let conn = connected(send(addr, &ssh(testing::STUDENT))?);
    assert_eq!(
        send(addr, &Request::List)?,
        Response::Connections(vec![conn])
    );
    let denied = send(addr, &ssh(testing::OTHER_STUDENT))?;
    assert_eq!(failure_kind(denied), "authorization_denied");

    daemon.shut_down();
    server.join().unwrap()?;
    Ok(())
}

#[test]
fn shutdown_waits_for_teardowns_in_flight() -> anyhow::Result<()> {
    let controller = testing::fabric(2).slow_deletes(Duration::from_millis(200));
    let daemon = Arc::new(Daemon::new(
        Pipeline::new(controller, PipelineOpts::default()),
        testing::catalog(),
    ));
    let conn = connected(daemon.handle(ssh(testing::STUDENT)));

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = {
        let daemon = Arc::clone(&daemon);
        thread::spawn(move || serve(daemon, listener))
    };
    let client = {
        let handler = conn.handler.to_string();
        thread::spawn(move || send(addr, &Request::Disconnect { handler }))
    };

    // Six deletes at 200ms each: the teardown is well under way but not done.
    thread::sleep(Duration::from_millis(500));
    daemon.shut_down();
    server.join().unwrap()?;
    assert!(daemon.pipeline().list().is_empty());
    assert!(daemon.pipeline().controller().installed().is_empty());
    assert_eq!(daemon.pipeline().controller().deletes(), conn.flows);

    assert_eq!(
        client.join().unwrap()?,
        Response::Disconnected {
            handler: conn.handler,
            deleted: conn.flows,
        }
    );
    Ok(())
}

const NEW_STUDENT: StudentCode = StudentCode::new(20209999);

fn add_new_student() -> Request {
    Request::Edit(CatalogEdit::AddStudent {
        code: NEW_STUDENT,
        name: "Rosa Quispe".into(),
        mac: "aa:bb:cc:00:00:09".into(),
    })
}

#[test]
fn edits_are_saved_and_swapped_in() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("catalog.yaml");
    labnet_utils::write_catalog(&path, &testing::catalog())?;
    let daemon = daemon(PipelineOpts::default()).with_catalog_path(&path);
    let before = daemon.catalog();

    let expected = testing::catalog();
    assert_eq!(
        daemon.handle(add_new_student()),
        Response::Edited {
            students: expected.students().len() + 1,
            courses: expected.courses().len(),
            servers: expected.servers().len(),
        }
    );
    assert!(before.student(NEW_STUDENT).is_none());
    assert_eq!(daemon.catalog().student(NEW_STUDENT).unwrap().name, "Rosa Quispe");
    let saved = labnet_utils::read_catalog(&path)?;
    assert_eq!(saved.student(NEW_STUDENT), daemon.catalog().student(NEW_STUDENT));

    // A reload reads back what was saved.
    daemon.handle(Request::Reload);
    assert!(daemon.catalog().student(NEW_STUDENT).is_some());
    Ok(())
}

#[test]
fn rejected_edits_change_nothing() {
    let daemon = daemon(PipelineOpts::default());
    let duplicate = daemon.handle(Request::Edit(CatalogEdit::AddStudent {
        code: testing::STUDENT,
        name: "Ana Torres".into(),
        mac: "aa:bb:cc:00:00:09".into(),
    }));
    assert_eq!(failure_kind(duplicate), "catalog");

    let bad_mac = daemon.handle(Request::Edit(CatalogEdit::UpdateStudent {
        code: testing::STUDENT,
        name: Some("Ana T.".into()),
        mac: Some("aa:bb:cc:00:00".into()),
    }));
    assert_eq!(failure_kind(bad_mac), "validation");

    let no_course = daemon.handle(Request::Edit(CatalogEdit::Enroll {
        course: "CS999".into(),
        student: testing::STUDENT,
    }));
    assert_eq!(failure_kind(no_course), "catalog");

    let expected = testing::catalog();
    assert_eq!(daemon.catalog().students(), expected.students());
    assert_eq!(daemon.catalog().courses(), expected.courses());
}

#[test]
fn unsaved_edit_is_not_applied() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let daemon = daemon(PipelineOpts::default()).with_catalog_path(dir.path().join("catalog.toml"));
    assert_eq!(failure_kind(daemon.handle(add_new_student())), "persist");
    assert!(daemon.catalog().student(NEW_STUDENT).is_none());
    Ok(())
}

#[test]
fn roster_edits_apply_to_later_connects() {
    let daemon = daemon(PipelineOpts::default());
    let unenroll = Request::Edit(CatalogEdit::Unenroll {
        course: "CS101".into(),
        student: testing::STUDENT,
    });
    assert!(matches!(daemon.handle(unenroll), Response::Edited { .. }));
    assert_eq!(
        failure_kind(daemon.handle(ssh(testing::STUDENT))),
        "authorization_denied"
    );

    let enroll = Request::Edit(CatalogEdit::Enroll {
        course: "CS101".into(),
        student: testing::STUDENT,
    });
    assert!(matches!(daemon.handle(enroll), Response::Edited { .. }));
    let conn = connected(daemon.handle(ssh(testing::STUDENT)));

    let remove = Request::Edit(CatalogEdit::RemoveStudent {
        code: testing::STUDENT,
    });
    assert!(matches!(daemon.handle(remove), Response::Edited { .. }));
    assert_eq!(failure_kind(daemon.handle(ssh(testing::STUDENT))), "not_found");
    // Removing a student leaves their live connections alone.
    assert_eq!(daemon.pipeline().list(), vec![conn]);
}
