//! Async front end that confines a [`TagClient`] to one OS thread.
//!
//! Provider SDKs are commonly thread-affine, and the client itself is not
//! synchronized. The worker builds the provider on its own thread and
//! serializes every request through a channel.

use crate::batch::{ReadResult, WriteResult};
use crate::client::{GroupRef, ItemLocation, TagClient};
use crate::config::ClientConfig;
use crate::error::{TagError, TagResult};
use crate::provider::{ItemReading, OpcValue, ProviderConnection, ServerState};
use crate::registry::GroupId;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

/// Bound on queued requests before callers wait.
const REQUEST_QUEUE_DEPTH: usize = 32;

/// Async trait over the tag client operations.
///
/// This is the stable surface front ends program against.
#[cfg_attr(any(test, feature = "test-support"), automock)]
#[async_trait]
pub trait TagService: Send + Sync {
    async fn connect(&self) -> TagResult<()>;

    /// Releases every group and disconnects.
    async fn disconnect(&self) -> TagResult<()>;

    /// Raw provider status code.
    async fn server_state(&self) -> TagResult<ServerState>;

    async fn add_group(&self, name: &str) -> TagResult<GroupId>;

    async fn add_tag(&self, group: GroupRef, tag_name: &str) -> TagResult<Vec<ItemLocation>>;

    async fn group_names(&self) -> TagResult<Vec<String>>;

    async fn tag_names(&self, group: GroupRef) -> TagResult<Vec<String>>;

    /// Reads a whole group in one round trip.
    ///
    /// # Errors
    /// Returns `Err` if not connected, the group is invalid, or the round
    /// trip fails. Per-item failures are part of the `ReadResult`.
    async fn read_all(&self, group: GroupRef) -> TagResult<ReadResult>;

    async fn read_tag(&self, tag_name: &str) -> TagResult<ItemReading>;

    /// Writes to every item carrying `tag_name`.
    async fn write_tag(&self, tag_name: &str, value: OpcValue) -> TagResult<Vec<WriteResult>>;
}

pub enum TagRequest {
    Connect {
        reply: oneshot::Sender<TagResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<TagResult<()>>,
    },
    ServerState {
        reply: oneshot::Sender<TagResult<ServerState>>,
    },
    AddGroup {
        name: String,
        reply: oneshot::Sender<TagResult<GroupId>>,
    },
    AddTag {
        group: GroupRef,
        tag_name: String,
        reply: oneshot::Sender<TagResult<Vec<ItemLocation>>>,
    },
    GroupNames {
        reply: oneshot::Sender<TagResult<Vec<String>>>,
    },
    TagNames {
        group: GroupRef,
        reply: oneshot::Sender<TagResult<Vec<String>>>,
    },
    ReadAll {
        group: GroupRef,
        reply: oneshot::Sender<TagResult<ReadResult>>,
    },
    ReadTag {
        tag_name: String,
        reply: oneshot::Sender<TagResult<ItemReading>>,
    },
    WriteTag {
        tag_name: String,
        value: OpcValue,
        reply: oneshot::Sender<TagResult<Vec<WriteResult>>>,
    },
}

/// Owns a [`TagClient`] on a dedicated thread.
pub struct TagWorker {
    sender: mpsc::Sender<TagRequest>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TagWorker {
    /// Spawns the worker thread and builds the provider on it.
    ///
    /// Blocks until the provider factory has run, so call it from a
    /// blocking context (e.g. `tokio::task::spawn_blocking`).
    ///
    /// # Errors
    /// Returns the factory's error, or `Internal` if the thread died first.
    pub fn start<P, F>(factory: F, config: ClientConfig) -> TagResult<Self>
    where
        P: ProviderConnection + 'static,
        F: FnOnce() -> TagResult<P> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (init_tx, init_rx) = oneshot::channel();

        let handle = std::thread::Builder::new()
            .name("tag-worker".into())
            .spawn(move || {
                let provider = match factory() {
                    Ok(p) => {
                        let _ = init_tx.send(Ok(()));
                        p
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Tag worker failed to build provider");
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };

                let mut client = TagClient::new(provider, config);
                while let Some(req) = rx.blocking_recv() {
                    Self::dispatch(&mut client, req);
                }

                if client.is_connected()
                    && let Err(e) = client.disconnect()
                {
                    tracing::warn!(error = %e, "Disconnect on worker shutdown failed");
                }
                tracing::debug!("Tag worker thread exiting cleanly");
            })
            .map_err(|e| TagError::Internal(format!("failed to spawn tag worker: {e}")))?;

        init_rx
            .blocking_recv()
            .map_err(|_| TagError::Internal("tag worker thread panicked during init".into()))??;

        tracing::debug!("Tag worker thread started");

        Ok(Self {
            sender: tx,
            handle: Some(handle),
        })
    }

    fn dispatch<P: ProviderConnection>(client: &mut TagClient<P>, req: TagRequest) {
        match req {
            TagRequest::Connect { reply } => {
                let _ = reply.send(client.connect());
            }
            TagRequest::Disconnect { reply } => {
                let _ = reply.send(client.disconnect());
            }
            TagRequest::ServerState { reply } => {
                let _ = reply.send(Ok(client.server_state()));
            }
            TagRequest::AddGroup { name, reply } => {
                let _ = reply.send(client.add_group(&name));
            }
            TagRequest::AddTag {
                group,
                tag_name,
                reply,
            } => {
                let _ = reply.send(client.add_tag(group, &tag_name));
            }
            TagRequest::GroupNames { reply } => {
                let _ = reply.send(Ok(client.group_names()));
            }
            TagRequest::TagNames { group, reply } => {
                let _ = reply.send(client.tag_names(group));
            }
            TagRequest::ReadAll { group, reply } => {
                let _ = reply.send(client.read_all(group));
            }
            TagRequest::ReadTag { tag_name, reply } => {
                let _ = reply.send(client.read_tag_reading(&tag_name));
            }
            TagRequest::WriteTag {
                tag_name,
                value,
                reply,
            } => {
                let _ = reply.send(client.write_tag(&tag_name, &value));
            }
        }
    }

    pub async fn send_request<F, R>(&self, req_builder: F) -> TagResult<R>
    where
        F: FnOnce(oneshot::Sender<TagResult<R>>) -> TagRequest,
    {
        if self
            .handle
            .as_ref()
            .is_some_and(std::thread::JoinHandle::is_finished)
        {
            tracing::error!("Tag worker thread panicked or exited unexpectedly");
            return Err(TagError::Internal("tag worker thread exited".into()));
        }

        let (tx, rx) = oneshot::channel();
        let req = req_builder(tx);

        self.sender
            .send(req)
            .await
            .map_err(|_| TagError::Internal("tag worker channel closed (worker stopped)".into()))?;

        rx.await
            .map_err(|_| TagError::Internal("tag worker shut down during request".into()))?
    }

    /// Stops the worker and waits for its thread, disconnecting first.
    ///
    /// Blocking; outside async code prefer this over a plain drop.
    pub fn shutdown(mut self) -> TagResult<()> {
        let handle = self.handle.take();
        drop(self);
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| TagError::Internal("tag worker thread panicked".into()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TagService for TagWorker {
    async fn connect(&self) -> TagResult<()> {
        self.send_request(|reply| TagRequest::Connect { reply }).await
    }

    async fn disconnect(&self) -> TagResult<()> {
        self.send_request(|reply| TagRequest::Disconnect { reply })
            .await
    }

    async fn server_state(&self) -> TagResult<ServerState> {
        self.send_request(|reply| TagRequest::ServerState { reply })
            .await
    }

    async fn add_group(&self, name: &str) -> TagResult<GroupId> {
        let name = name.to_string();
        self.send_request(|reply| TagRequest::AddGroup { name, reply })
            .await
    }

    async fn add_tag(&self, group: GroupRef, tag_name: &str) -> TagResult<Vec<ItemLocation>> {
        let tag_name = tag_name.to_string();
        self.send_request(|reply| TagRequest::AddTag {
            group,
            tag_name,
            reply,
        })
        .await
    }

    async fn group_names(&self) -> TagResult<Vec<String>> {
        self.send_request(|reply| TagRequest::GroupNames { reply })
            .await
    }

    async fn tag_names(&self, group: GroupRef) -> TagResult<Vec<String>> {
        self.send_request(|reply| TagRequest::TagNames { group, reply })
            .await
    }

    async fn read_all(&self, group: GroupRef) -> TagResult<ReadResult> {
        self.send_request(|reply| TagRequest::ReadAll { group, reply })
            .await
    }

    async fn read_tag(&self, tag_name: &str) -> TagResult<ItemReading> {
        let tag_name = tag_name.to_string();
        self.send_request(|reply| TagRequest::ReadTag { tag_name, reply })
            .await
    }

    async fn write_tag(&self, tag_name: &str, value: OpcValue) -> TagResult<Vec<WriteResult>> {
        let tag_name = tag_name.to_string();
        self.send_request(|reply| TagRequest::WriteTag {
            tag_name,
            value,
            reply,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProviderConnection;

    #[tokio::test]
    async fn test_worker_reports_factory_failure() {
        let result = tokio::task::spawn_blocking(|| {
            TagWorker::start(
                || -> TagResult<MockProviderConnection> {
                    Err(TagError::Connection("no SDK installed".into()))
                },
                ClientConfig::default(),
            )
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(TagError::Connection(_))));
    }

    #[tokio::test]
    async fn test_worker_forwards_not_connected() {
        let worker = tokio::task::spawn_blocking(|| {
            TagWorker::start(
                || {
                    let mut provider = MockProviderConnection::new();
                    provider
                        .expect_state()
                        .return_const(ServerState::DISCONNECTED);
                    provider.expect_disconnect().returning(|| Ok(()));
                    Ok(provider)
                },
                ClientConfig::default(),
            )
            .unwrap()
        })
        .await
        .unwrap();

        let err = worker.add_group("G").await.unwrap_err();
        assert!(matches!(err, TagError::NotConnected { .. }));
        assert_eq!(
            worker.server_state().await.unwrap(),
            ServerState::DISCONNECTED
        );
        tokio::task::spawn_blocking(move || worker.shutdown())
            .await
            .unwrap()
            .unwrap();
    }

    #[cfg(feature = "simulator")]
    #[tokio::test]
    async fn test_worker_round_trip_with_simulator() {
        use crate::backend::simulated::SimulatedProvider;

        let worker = tokio::task::spawn_blocking(|| {
            TagWorker::start(
                || {
                    Ok(SimulatedProvider::new()
                        .with_point("[S]A", OpcValue::Int(10))
                        .with_point("[S]B", OpcValue::Bool(false)))
                },
                ClientConfig::default(),
            )
            .unwrap()
        })
        .await
        .unwrap();

        worker.connect().await.unwrap();
        worker.add_group("G").await.unwrap();
        worker.add_tag("G".into(), "[S]A").await.unwrap();
        worker.add_tag(GroupRef::Id(0), "[S]B").await.unwrap();

        let result = worker.read_all("G".into()).await.unwrap();
        assert_eq!(result.names(), ["[S]A", "[S]B"]);
        assert_eq!(result.values(), ["10", "false"]);

        let writes = worker.write_tag("[S]B", OpcValue::Bool(true)).await.unwrap();
        assert!(writes[0].success);
        let reading = worker.read_tag("[S]B").await.unwrap();
        assert_eq!(reading.value, OpcValue::Bool(true));

        assert_eq!(worker.group_names().await.unwrap(), ["G"]);
        assert_eq!(worker.tag_names("G".into()).await.unwrap(), ["[S]A", "[S]B"]);

        worker.disconnect().await.unwrap();
        assert_eq!(
            worker.server_state().await.unwrap(),
            ServerState::DISCONNECTED
        );
    }

    #[cfg(feature = "simulator")]
    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        use crate::backend::simulated::SimulatedProvider;
        use std::sync::Arc;

        let worker = tokio::task::spawn_blocking(|| {
            TagWorker::start(
                || Ok(SimulatedProvider::new().with_point("[S]A", OpcValue::Int(1))),
                ClientConfig::default(),
            )
            .unwrap()
        })
        .await
        .unwrap();
        let worker = Arc::new(worker);
        worker.connect().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let worker = Arc::clone(&worker);
            tasks.push(tokio::spawn(async move {
                worker.add_group(&format!("G{i}")).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut names = worker.group_names().await.unwrap();
        assert_eq!(names.len(), 8);
        names.sort();
        assert_eq!(names[0], "G0");
    }
}
