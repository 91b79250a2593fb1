#![allow(dead_code)]
use async_trait::async_trait;
use drive_sync::drive_service::drive_client::RemoteStore;
use drive_sync::drive_service::drive_models::{ObjectKind, RemoteObjectReference};
use drive_sync::error::{AuthError, DriveError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One primitive call received by the mock, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Find {
        name: String,
        parent_id: Option<String>,
    },
    CreateFile {
        name: String,
        parent_id: Option<String>,
    },
    CreateFolder {
        name: String,
        parent_id: Option<String>,
    },
    UpdateContent {
        id: String,
    },
}

/// Object held by the in-memory store
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub kind: ObjectKind,
    pub content: Vec<u8>,
}

impl StoredObject {
    fn reference(&self) -> RemoteObjectReference {
        RemoteObjectReference {
            id: self.id.clone(),
            name: self.name.clone(),
            parent_id: self.parent_id.clone(),
            kind: self.kind,
        }
    }
}

#[derive(Default)]
struct StoreState {
    /// Kept in creation order, `find` returns the earliest match
    objects: Vec<StoredObject>,
    calls: Vec<RemoteCall>,
    next_id: usize,
    /// Operation name -> object names that fail ("*" fails every call)
    failures: HashMap<String, Vec<String>>,
    /// Same keying, but the call fails as if the connection dropped
    transport_failures: HashMap<String, Vec<String>>,
    auth_failure: bool,
}

fn fails_for(failures: &HashMap<String, Vec<String>>, operation: &str, subject: &str) -> bool {
    failures
        .get(operation)
        .map(|names| names.iter().any(|n| n == "*" || n == subject))
        .unwrap_or(false)
}

/// A genuine reqwest connect error, from a port nothing listens on
async fn transport_error() -> reqwest::Error {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("Failed to reserve a local port");
    reqwest::get(format!("http://127.0.0.1:{}/", port))
        .await
        .expect_err("nothing listens on a released port")
}

/// In-memory `RemoteStore` recording every primitive call
#[derive(Clone, Default)]
pub struct MockRemoteStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail for objects named `name`
    pub fn fail_operation_for(&self, operation: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .failures
            .entry(operation.to_string())
            .or_default()
            .push(name.to_string());
    }

    /// Make `operation` fail with a transport error for objects named `name`
    pub fn fail_transport_for(&self, operation: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .transport_failures
            .entry(operation.to_string())
            .or_default()
            .push(name.to_string());
    }

    /// Make `operation` fail for every object
    pub fn make_operation_fail(&self, operation: &str) {
        self.fail_operation_for(operation, "*");
    }

    /// Every call fails as if the credential could not be refreshed
    pub fn fail_with_auth_error(&self) {
        self.state.lock().unwrap().auth_failure = true;
    }

    pub fn clear_operation_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failures.clear();
        state.transport_failures.clear();
        state.auth_failure = false;
    }

    /// Seed an object as if it had been created by an earlier run
    pub fn insert_object(
        &self,
        name: &str,
        parent_id: Option<&str>,
        kind: ObjectKind,
        content: &[u8],
    ) -> String {
        let mut state = self.state.lock().unwrap();
        Self::store_object(&mut state, name, parent_id, kind, content).id
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.state.lock().unwrap().objects.clone()
    }

    /// Objects named `name`, in creation order
    pub fn objects_named(&self, name: &str) -> Vec<StoredObject> {
        self.objects()
            .into_iter()
            .filter(|object| object.name == name)
            .collect()
    }

    pub fn get_call_count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| operation_name(call) == operation)
            .count()
    }

    fn store_object(
        state: &mut StoreState,
        name: &str,
        parent_id: Option<&str>,
        kind: ObjectKind,
        content: &[u8],
    ) -> StoredObject {
        state.next_id += 1;
        let object = StoredObject {
            id: format!("id{}", state.next_id),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            kind,
            content: content.to_vec(),
        };
        state.objects.push(object.clone());
        object
    }

    /// Record the call and decide whether it should fail
    async fn record(&self, call: RemoteCall, subject: &str) -> Result<(), DriveError> {
        let operation = operation_name(&call);
        let (auth_failure, api_failure, transport_failure) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            (
                state.auth_failure,
                fails_for(&state.failures, operation, subject),
                fails_for(&state.transport_failures, operation, subject),
            )
        };

        if auth_failure {
            return Err(DriveError::Auth(AuthError::MissingRefreshToken));
        }
        if transport_failure {
            return Err(DriveError::Network {
                operation,
                source: transport_error().await,
            });
        }
        if api_failure {
            return Err(DriveError::Api {
                operation,
                status: 500,
                body: format!("Mock {} failure for {}", operation, subject),
            });
        }
        Ok(())
    }
}

fn operation_name(call: &RemoteCall) -> &'static str {
    match call {
        RemoteCall::Find { .. } => "find",
        RemoteCall::CreateFile { .. } => "create_file",
        RemoteCall::CreateFolder { .. } => "create_folder",
        RemoteCall::UpdateContent { .. } => "update_content",
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn create_file(
        &self,
        content: &[u8],
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError> {
        self.record(
            RemoteCall::CreateFile {
                name: name.to_string(),
                parent_id: parent_id.map(str::to_string),
            },
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        Ok(Self::store_object(&mut state, name, parent_id, ObjectKind::File, content).reference())
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<RemoteObjectReference, DriveError> {
        self.record(
            RemoteCall::CreateFolder {
                name: name.to_string(),
                parent_id: parent_id.map(str::to_string),
            },
            name,
        )
        .await?;
        let mut state = self.state.lock().unwrap();
        Ok(Self::store_object(&mut state, name, parent_id, ObjectKind::Folder, &[]).reference())
    }

    async fn find(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<RemoteObjectReference>, DriveError> {
        self.record(
            RemoteCall::Find {
                name: name.to_string(),
                parent_id: parent_id.map(str::to_string),
            },
            name,
        )
        .await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .find(|object| {
                object.name == name
                    && parent_id.map_or(true, |p| object.parent_id.as_deref() == Some(p))
            })
            .map(StoredObject::reference))
    }

    async fn update_content(
        &self,
        id: &str,
        content: &[u8],
    ) -> Result<RemoteObjectReference, DriveError> {
        self.record(RemoteCall::UpdateContent { id: id.to_string() }, id)
            .await?;
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .iter_mut()
            .find(|object| object.id == id)
            .ok_or_else(|| DriveError::Api {
                operation: "update_content",
                status: 404,
                body: format!("File not found: {}", id),
            })?;
        object.content = content.to_vec();
        Ok(object.reference())
    }
}
