use std::{thread, time::Duration};

use labnet_core::{AttachmentPoint, Controller, ControllerError, Device, FlowRule, RouteHop};
use reqwest::{blocking::Response, StatusCode};

use crate::wire::{self, DeleteEntry, DeviceListing, StaticFlowEntry, WireHop};

/// The controller address used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://192.168.200.200:8080";

const STATIC_FLOW_PATH: &str = "/wm/staticflowpusher/json";

/// Floodlight client options.
#[derive(Debug, Clone, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct FloodlightOpts {
    /// Where the REST API is served, e.g. `http://127.0.0.1:8080`.
    #[builder(default = DEFAULT_BASE_URL.to_owned(), setter(into))]
    pub base_url: String,
    /// Timeout for each request.
    #[builder(default = Duration::from_secs(5))]
    pub timeout: Duration,
    /// Extra attempts after a transport failure or timeout. Error statuses are never retried.
    #[builder(default = 2)]
    pub retries: usize,
    /// Pause between attempts.
    #[builder(default = Duration::from_millis(250))]
    pub backoff: Duration,
}

impl Default for FloodlightOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A [`Controller`] backed by Floodlight's REST API.
#[derive(Debug)]
pub struct FloodlightController {
    http: reqwest::blocking::Client,
    opts: FloodlightOpts,
}

impl FloodlightController {
    /// Creates a client. This function returns an error if the HTTP client cannot be
    /// initialized.
    pub fn new(opts: FloodlightOpts) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(opts.timeout)
            .build()?;
        Ok(Self { http, opts })
    }

    /// Returns the client options.
    pub fn opts(&self) -> &FloodlightOpts {
        &self.opts
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.opts.base_url.trim_end_matches('/'))
    }

    /// Runs `f` until it succeeds, fails with something other than a transport error or
    /// timeout, or runs out of attempts.
    fn with_retries<T>(
        &self,
        call: &str,
        f: impl Fn() -> Result<T, ControllerError>,
    ) -> Result<T, ControllerError> {
        let mut attempt = 0;
        loop {
            match f() {
                Err(e @ (ControllerError::Timeout { .. } | ControllerError::Transport { .. }))
                    if attempt < self.opts.retries =>
                {
                    attempt += 1;
                    log::warn!("{e}; retrying {call} ({attempt}/{})", self.opts.retries);
                    thread::sleep(self.opts.backoff);
                }
                res => return res,
            }
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ControllerError> {
        let call = format!("GET {path}");
        self.with_retries(&call, || {
            let resp = self
                .http
                .get(self.url(path))
                .send()
                .map_err(|e| transport(&call, e))?;
            let body = success(&call, resp)?
                .text()
                .map_err(|e| transport(&call, e))?;
            serde_json::from_str(&body).map_err(|e| ControllerError::Malformed {
                call: call.clone(),
                reason: e.to_string(),
            })
        })
    }
}

impl Controller for FloodlightController {
    fn devices(&self) -> Result<Vec<Device>, ControllerError> {
        let listing: DeviceListing = self.get_json("/wm/device/")?;
        Ok(listing.into_devices())
    }

    fn route(
        &self,
        src: &AttachmentPoint,
        dst: &AttachmentPoint,
    ) -> Result<Vec<RouteHop>, ControllerError> {
        let path = format!(
            "/wm/topology/route/{}/{}/{}/{}/json",
            src.switch, src.port, dst.switch, dst.port
        );
        let hops: Vec<WireHop> = self.get_json(&path)?;
        wire::route_from_wire(hops).map_err(|reason| ControllerError::Malformed {
            call: format!("GET {path}"),
            reason,
        })
    }

    fn push_flow(&self, rule: &FlowRule) -> Result<(), ControllerError> {
        let call = format!("POST {STATIC_FLOW_PATH} ({})", rule.name);
        let entry = StaticFlowEntry::from(rule);
        self.with_retries(&call, || {
            let resp = self
                .http
                .post(self.url(STATIC_FLOW_PATH))
                .json(&entry)
                .send()
                .map_err(|e| transport(&call, e))?;
            success(&call, resp)?;
            Ok(())
        })?;
        log::debug!("pushed {} to {}", rule.name, rule.switch);
        Ok(())
    }

    fn delete_flow(&self, name: &str) -> Result<(), ControllerError> {
        let call = format!("DELETE {STATIC_FLOW_PATH} ({name})");
        self.with_retries(&call, || {
            let resp = self
                .http
                .delete(self.url(STATIC_FLOW_PATH))
                .json(&DeleteEntry { name })
                .send()
                .map_err(|e| transport(&call, e))?;
            if resp.status() == StatusCode::NOT_FOUND {
                log::debug!("{name} was already absent");
                return Ok(());
            }
            success(&call, resp)?;
            Ok(())
        })
    }
}

fn transport(call: &str, e: reqwest::Error) -> ControllerError {
    if e.is_timeout() {
        ControllerError::Timeout {
            call: call.to_owned(),
        }
    } else {
        ControllerError::Transport {
            call: call.to_owned(),
            reason: e.to_string(),
        }
    }
}

fn success(call: &str, resp: Response) -> Result<Response, ControllerError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ControllerError::Status {
            call: call.to_owned(),
            status: status.as_u16(),
            body: resp.text().unwrap_or_default(),
        })
    }
}
