use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use labnet_core::{catalog::StudentCode, ConnectRequest, InstallMode, PipelineOpts};
use labnet_floodlight::{FloodlightOpts, DEFAULT_BASE_URL};
use labnet_worker::{CatalogEdit, Request, Response, WorkerOpts};

#[derive(Parser, Debug)]
#[command(version, about = "Grants students access to lab servers through an SDN controller")]
struct Args {
    /// Address of the worker to talk to
    #[arg(short, long, global = true, env = "LABNET_WORKER", default_value = "127.0.0.1:8080")]
    worker: SocketAddr,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a worker
    Serve {
        /// Port to open worker on
        #[arg(short, long, env = "LABNET_PORT", default_value_t = 8080)]
        port: u16,
        /// Catalog file (YAML, JSON or Dhall)
        #[arg(short, long, env = "LABNET_CATALOG")]
        catalog: PathBuf,
        /// Base URL of the Floodlight REST API
        #[arg(long, env = "LABNET_CONTROLLER", default_value = DEFAULT_BASE_URL)]
        controller: String,
        /// Per-request timeout, in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Extra attempts after a transport failure
        #[arg(long, default_value_t = 2)]
        retries: usize,
        /// Push rules concurrently
        #[arg(long)]
        parallel: bool,
        /// Seconds a connection lives before it is torn down
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        ttl: Option<u32>,
        /// Seconds between sweeps for expired connections
        #[arg(long, default_value_t = 60)]
        sweep: u64,
        /// Seed for handler suffixes
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Grant a student access to a service
    Connect {
        student: u64,
        server: String,
        service: String,
    },
    /// Tear a connection down
    Disconnect { handler: String },
    /// List live connections
    List,
    /// Re-read the worker's catalog file
    Reload,
    /// Add, change or remove a student
    Student {
        #[command(subcommand)]
        action: StudentAction,
    },
    /// Put a student on a course roster
    Enroll { course: String, student: u64 },
    /// Take a student off a course roster
    Unenroll { course: String, student: u64 },
}

#[derive(Subcommand, Debug)]
enum StudentAction {
    Add {
        code: u64,
        name: String,
        mac: String,
    },
    Update {
        code: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mac: Option<String>,
    },
    Remove { code: u64 },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let request = match args.command {
        Command::Serve {
            port,
            catalog,
            controller,
            timeout_ms,
            retries,
            parallel,
            ttl,
            sweep,
            seed,
        } => {
            let floodlight = FloodlightOpts::builder()
                .base_url(controller)
                .timeout(Duration::from_millis(timeout_ms))
                .retries(retries)
                .build();
            let mut pipeline = PipelineOpts::default();
            if parallel {
                pipeline.install_mode = InstallMode::Parallel;
            }
            pipeline.ttl = ttl.map(|secs| chrono::Duration::seconds(i64::from(secs)));
            pipeline.seed = seed;
            let opts = WorkerOpts::builder()
                .port(port)
                .catalog(catalog)
                .floodlight(floodlight)
                .pipeline(pipeline)
                .sweep(Duration::from_secs(sweep))
                .build();
            return labnet_worker::start(opts);
        }
        Command::Connect {
            student,
            server,
            service,
        } => Request::Connect(
            ConnectRequest::builder()
                .student(StudentCode::new(student))
                .server(server)
                .service(service)
                .build(),
        ),
        Command::Disconnect { handler } => Request::Disconnect { handler },
        Command::List => Request::List,
        Command::Reload => Request::Reload,
        Command::Student { action } => Request::Edit(match action {
            StudentAction::Add { code, name, mac } => CatalogEdit::AddStudent {
                code: StudentCode::new(code),
                name,
                mac,
            },
            StudentAction::Update { code, name, mac } => CatalogEdit::UpdateStudent {
                code: StudentCode::new(code),
                name,
                mac,
            },
            StudentAction::Remove { code } => CatalogEdit::RemoveStudent {
                code: StudentCode::new(code),
            },
        }),
        Command::Enroll { course, student } => Request::Edit(CatalogEdit::Enroll {
            course,
            student: StudentCode::new(student),
        }),
        Command::Unenroll { course, student } => Request::Edit(CatalogEdit::Unenroll {
            course,
            student: StudentCode::new(student),
        }),
    };

    match labnet_worker::send(args.worker, &request)? {
        Response::Connected(conn) => {
            println!("{}", conn.handler);
            for name in &conn.flows {
                log::debug!("installed {name}");
            }
        }
        Response::Disconnected { handler, deleted } => {
            println!("{handler}: removed {} rules", deleted.len());
        }
        Response::Connections(conns) => {
            for c in conns {
                let expires = c
                    .expires_at
                    .map_or_else(|| "-".to_owned(), |t| t.to_rfc3339());
                println!(
                    "{}\t{}\t{}/{}\t{}\t{}\t{} rules",
                    c.handler,
                    c.student,
                    c.server,
                    c.service,
                    c.created_at.to_rfc3339(),
                    expires,
                    c.flows.len()
                );
            }
        }
        Response::Reloaded {
            students,
            courses,
            servers,
        }
        | Response::Edited {
            students,
            courses,
            servers,
        } => println!("{students} students, {courses} courses, {servers} servers"),
        Response::Failed { kind, message } => anyhow::bail!("{kind}: {message}"),
    }
    Ok(())
}
