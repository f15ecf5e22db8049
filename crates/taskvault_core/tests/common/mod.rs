#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use taskvault_core::{
    open_cache, LocalCacheStore, NewTask, RemoteError, RemoteResult, ServerId, StaticCredentials,
    SyncContext, SyncOrchestrator, Task, TaskGateway, TaskId, TaskPatch, TaskService, UserProfile,
};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create(String),
    Update(ServerId, TaskPatch),
    Delete(ServerId),
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    Update,
    Delete,
    Profile,
}

type Hook = Box<dyn Fn(Op) + Send + Sync>;

/// In-memory stand-in for the remote task collection.
///
/// Behaves like a small server (ids assigned from 1, 404 for unknown ids)
/// unless a failure is scripted for the next call of an operation. Every call
/// yields once so concurrent callers interleave on a single-threaded runtime.
pub struct MockGateway {
    server: Mutex<Vec<Task>>,
    next_id: Mutex<ServerId>,
    failures: Mutex<HashMap<Op, VecDeque<RemoteError>>>,
    calls: Mutex<Vec<Call>>,
    profile: Mutex<UserProfile>,
    hook: Mutex<Option<Hook>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            server: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            profile: Mutex::new(UserProfile {
                username: "ada".to_string(),
                full_name: Some("Ada Lovelace".to_string()),
                first_name: Some("Ada".to_string()),
                email: None,
            }),
            hook: Mutex::new(None),
        }
    }
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds a server-side task and returns it.
    pub fn seed(&self, id: ServerId, title: &str, completed: bool) -> Task {
        let task = server_task(id, title, None, completed);
        self.server.lock().push(task.clone());
        let mut next_id = self.next_id.lock();
        *next_id = (*next_id).max(id + 1);
        task
    }

    pub fn fail_next(&self, op: Op, err: RemoteError) {
        self.failures.lock().entry(op).or_default().push_back(err);
    }

    /// Runs `hook` at the start of every call, before the response is decided.
    pub fn on_call(&self, hook: impl Fn(Op) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn server_tasks(&self) -> Vec<Task> {
        self.server.lock().clone()
    }

    fn enter(&self, op: Op, call: Call) -> RemoteResult<()> {
        self.calls.lock().push(call);
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(op);
        }
        match self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskGateway for MockGateway {
    async fn list(&self) -> RemoteResult<Vec<Task>> {
        tokio::task::yield_now().await;
        self.enter(Op::List, Call::List)?;
        Ok(self.server.lock().clone())
    }

    async fn create(&self, task: &NewTask) -> RemoteResult<Task> {
        tokio::task::yield_now().await;
        self.enter(Op::Create, Call::Create(task.title.clone()))?;
        let id = {
            let mut next_id = self.next_id.lock();
            let id = *next_id;
            *next_id += 1;
            id
        };
        let created = server_task(id, &task.title, task.due_date, task.completed);
        self.server.lock().push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: ServerId, patch: &TaskPatch) -> RemoteResult<Task> {
        tokio::task::yield_now().await;
        self.enter(Op::Update, Call::Update(id, patch.clone()))?;
        let mut server = self.server.lock();
        let task = server
            .iter_mut()
            .find(|task| task.id == TaskId::Server(id))
            .ok_or_else(|| RemoteError::from_status(404, "Not found."))?;
        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        Ok(task.clone())
    }

    async fn delete(&self, id: ServerId) -> RemoteResult<()> {
        tokio::task::yield_now().await;
        self.enter(Op::Delete, Call::Delete(id))?;
        let mut server = self.server.lock();
        let before = server.len();
        server.retain(|task| task.id != TaskId::Server(id));
        if server.len() == before {
            return Err(RemoteError::from_status(404, "Not found."));
        }
        Ok(())
    }

    async fn fetch_profile(&self) -> RemoteResult<UserProfile> {
        tokio::task::yield_now().await;
        self.enter(Op::Profile, Call::Profile)?;
        Ok(self.profile.lock().clone())
    }
}

pub fn server_task(id: ServerId, title: &str, due_date: Option<NaiveDate>, completed: bool) -> Task {
    Task {
        id: TaskId::Server(id),
        title: title.to_string(),
        due_date,
        completed,
        pending_sync: false,
    }
}

pub fn date(raw: &str) -> NaiveDate {
    raw.parse().unwrap()
}

/// Everything a test needs around one shared context.
pub struct Harness {
    pub ctx: Arc<SyncContext>,
    pub service: TaskService,
    pub orchestrator: SyncOrchestrator,
    pub gateway: Arc<MockGateway>,
    pub credentials: Arc<StaticCredentials>,
}

pub fn harness_with(store: LocalCacheStore, gateway: Arc<MockGateway>, online: bool) -> Harness {
    let credentials = Arc::new(StaticCredentials::new(Some("token-1".to_string())));
    let ctx = SyncContext::new(store, gateway.clone(), credentials.clone(), online);
    Harness {
        service: TaskService::new(ctx.clone()),
        orchestrator: SyncOrchestrator::new(ctx.clone()),
        ctx,
        gateway,
        credentials,
    }
}

pub fn harness(path: &Path, online: bool) -> Harness {
    harness_with(open_cache(path).unwrap(), MockGateway::new(), online)
}

/// Reads the cache through a second connection.
pub fn cached_tasks(path: &Path) -> Vec<Task> {
    open_cache(path).unwrap().load_tasks()
}

pub fn cache_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("cache.sqlite3")
}
