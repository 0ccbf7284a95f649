//! Messages exchanged with a worker. Each TCP connection carries one MessagePack-encoded
//! [`Request`] and one [`Response`].

use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use anyhow::Context;
use labnet_core::{catalog::StudentCode, ConnectRequest, Connection, Handler};

/// A request to a worker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Request {
    /// Grant a student access to a service.
    Connect(ConnectRequest),
    /// Tear a connection down. The handler is validated by the worker.
    Disconnect { handler: String },
    /// List live connections.
    List,
    /// Re-read the catalog file.
    Reload,
    /// Change the catalog and write it back to the catalog file.
    Edit(CatalogEdit),
}

/// A change to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CatalogEdit {
    AddStudent {
        code: StudentCode,
        name: String,
        mac: String,
    },
    /// Fields left as `None` keep their value.
    UpdateStudent {
        code: StudentCode,
        name: Option<String>,
        mac: Option<String>,
    },
    /// Also takes the student off every roster.
    RemoveStudent { code: StudentCode },
    Enroll { course: String, student: StudentCode },
    Unenroll { course: String, student: StudentCode },
}

/// A worker's answer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Response {
    Connected(Connection),
    Disconnected { handler: Handler, deleted: Vec<String> },
    Connections(Vec<Connection>),
    Reloaded {
        students: usize,
        courses: usize,
        servers: usize,
    },
    Edited {
        students: usize,
        courses: usize,
        servers: usize,
    },
    /// The request failed. `kind` is a stable name, e.g. `authorization_denied`.
    Failed { kind: String, message: String },
}

/// Sends a request to the worker at `addr` and waits for its response.
pub fn send(addr: SocketAddr, request: &Request) -> anyhow::Result<Response> {
    let mut stream =
        TcpStream::connect(addr).with_context(|| format!("failed to connect to worker {addr}"))?;
    let buf = rmp_serde::encode::to_vec(request)?;
    stream.write_all(&buf)?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;
    let response = rmp_serde::decode::from_read(BufReader::new(&stream))
        .with_context(|| "failed to decode worker response")?;
    Ok(response)
}
