use std::path::{Path, PathBuf};
use std::thread;

use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{Body, HydroShare, decode, require};
use crate::download::{ByteStream, Overwrite, extract_zip};
use crate::error::{Error, Result, Scope};
use crate::resource::ensure_dir;

#[derive(Debug, serde::Deserialize)]
struct BagTask {
    #[serde(default)]
    task_id: Option<String>,
}

enum BagReply {
    Ready(Response),
    Generating(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Ready,
    Failed,
}

impl TaskState {
    fn of(status: &Value) -> Option<TaskState> {
        let field = status.get("status").unwrap_or(status);
        match field {
            Value::Bool(true) => Some(TaskState::Ready),
            Value::Bool(false) | Value::Null => Some(TaskState::Pending),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "done" | "completed" | "success" | "successful" => Some(TaskState::Ready),
                "false" | "pending" | "progress" | "started" | "queued" | "running" => {
                    Some(TaskState::Pending)
                }
                "failed" | "failure" | "error" => Some(TaskState::Failed),
                _ => None,
            },
            _ => None,
        }
    }
}

impl HydroShare {
    /// Streams the BagIt archive of a resource.
    ///
    /// Bags are regenerated lazily by the server. While one is being built the client
    /// checks the task status at the fixed poll interval until it is done, with no upper
    /// bound on the wait. With [`HydroShare::with_wait_for_bag`] set to `false` it fails
    /// with [`Error::BagNotReady`] instead.
    pub fn get_resource_stream(&self, pid: &str) -> Result<ByteStream> {
        require("pid", pid)?;
        loop {
            match self.request_bag(pid)? {
                BagReply::Ready(resp) => {
                    return Ok(ByteStream::from_response(resp, self.progress()));
                }
                BagReply::Generating(task_id) => {
                    if !self.wait_for_bag() {
                        return Err(Error::BagNotReady {
                            pid: pid.to_string(),
                            task_id: Some(task_id),
                        });
                    }
                    let checks = self.wait_for_task(pid, &task_id)?;
                    debug!(pid, task_id = %task_id, checks, "bag ready");
                }
            }
        }
    }

    /// Downloads the bag of a resource to `destination/{pid}.zip`.
    ///
    /// With `unzip` set, the archive is extracted into `destination/{pid}` following the
    /// overwrite policy, the zip is removed and the extraction directory is returned.
    pub fn get_resource(
        &self,
        pid: &str,
        destination: &Path,
        unzip: Option<Overwrite>,
    ) -> Result<PathBuf> {
        ensure_dir(destination)?;
        let stream = self.get_resource_stream(pid)?;
        let zip_path = stream.save(&destination.join(format!("{pid}.zip")))?;

        let Some(overwrite) = unzip else {
            return Ok(zip_path);
        };

        let target = destination.join(pid);
        let files = extract_zip(&zip_path, &target, overwrite)?;
        std::fs::remove_file(&zip_path).map_err(|e| Error::io(&zip_path, e))?;
        info!(pid, files, destination = %target.display(), "bag extracted");
        Ok(target)
    }

    fn request_bag(&self, pid: &str) -> Result<BagReply> {
        let url = self.endpoint(&["resource", pid], true)?;
        let resp = self.execute(Method::GET, url.clone(), Body::Empty, Scope::resource(pid))?;

        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        if resp.status() != StatusCode::ACCEPTED && !is_json {
            return Ok(BagReply::Ready(resp));
        }

        let task: BagTask = decode("GET", resp)?;
        let task_id = task.task_id.filter(|t| !t.is_empty()).ok_or_else(|| Error::Protocol {
            url: url.to_string(),
            message: "bag is not ready but no task_id was returned".into(),
        })?;
        info!(pid, task_id = %task_id, "bag is being generated");
        Ok(BagReply::Generating(task_id))
    }

    /// Polls the task status until the bag is ready, returning the number of checks made.
    fn wait_for_task(&self, pid: &str, task_id: &str) -> Result<usize> {
        let mut checks = 0usize;
        let mut last_state: Option<TaskState> = None;

        loop {
            thread::sleep(self.poll_interval());
            checks += 1;

            let status = self.get_task_status(task_id)?;
            let state = match TaskState::of(&status) {
                Some(s) => s,
                None => {
                    warn!(pid, task_id, status = %status, "unknown task status");
                    return Err(Error::Protocol {
                        url: self
                            .endpoint(&["taskstatus", task_id], true)
                            .map(|u| u.to_string())
                            .unwrap_or_default(),
                        message: format!("unknown task status {status}"),
                    });
                }
            };

            if last_state != Some(state) {
                last_state = Some(state);
                info!(pid, task_id, state = ?state, checks, "bag task status");
            }

            match state {
                TaskState::Ready => return Ok(checks),
                TaskState::Pending => continue,
                TaskState::Failed => {
                    return Err(Error::BagFailed {
                        pid: pid.to_string(),
                        task_id: task_id.to_string(),
                    });
                }
            }
        }
    }
}
