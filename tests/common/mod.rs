//! In-memory writer + factory used to exercise `WriterPool` without a real
//! storage engine backing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use journal_writer_pool::{CloseInterceptor, ConstructionError, JournalMetadata, PooledWriter, WriterFactory};

pub struct Meta(pub String);

impl JournalMetadata for Meta {
    fn name(&self) -> &str {
        &self.0
    }
}

/// A writer backed by nothing but an id and a shared destroy counter, used
/// so tests can assert "exactly once" physical destruction.
pub struct MockWriter {
    name: String,
    id: u64,
    hook: Mutex<Option<Arc<dyn CloseInterceptor>>>,
    destroyed: Arc<AtomicUsize>,
}

impl MockWriter {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Client-facing close path: ask the pool first, destroy only if told to.
    pub fn close(self: &Arc<Self>) {
        let hook = self.hook.lock().unwrap().clone();
        let should_destroy = match hook {
            Some(h) => h.can_close(self.as_ref()),
            None => true,
        };
        if should_destroy {
            let _ = PooledWriter::destroy(self.as_ref());
        }
    }
}

impl PooledWriter for MockWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn install_close_interceptor(&self, hook: Arc<dyn CloseInterceptor>) {
        *self.hook.lock().unwrap() = Some(hook);
    }

    fn clear_close_interceptor(&self) {
        *self.hook.lock().unwrap() = None;
    }

    fn destroy(&self) -> Result<(), anyhow::Error> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Lets a test pause a [`MockFactory::construct`] call for a given name
/// partway through, so a racing acquirer can be driven into the "creator is
/// still inside the base factory" window deterministically instead of
/// relying on timing.
pub struct ConstructGate {
    entered: Mutex<bool>,
    entered_cv: Condvar,
    release: Mutex<bool>,
    release_cv: Condvar,
}

impl ConstructGate {
    fn new() -> Self {
        ConstructGate {
            entered: Mutex::new(false),
            entered_cv: Condvar::new(),
            release: Mutex::new(false),
            release_cv: Condvar::new(),
        }
    }

    /// Blocks until the gated `construct` call has actually started.
    pub fn wait_until_entered(&self) {
        let mut entered = self.entered.lock().unwrap();
        while !*entered {
            entered = self.entered_cv.wait(entered).unwrap();
        }
    }

    /// Lets the gated `construct` call proceed to completion.
    pub fn release(&self) {
        *self.release.lock().unwrap() = true;
        self.release_cv.notify_all();
    }

    fn signal_entered(&self) {
        *self.entered.lock().unwrap() = true;
        self.entered_cv.notify_all();
    }

    fn wait_for_release(&self) {
        let mut released = self.release.lock().unwrap();
        while !*released {
            released = self.release_cv.wait(released).unwrap();
        }
    }
}

/// Factory that hands out sequentially-numbered [`MockWriter`]s, optionally
/// failing construction for a configured set of names, and optionally
/// pausing construction for a name on a caller-supplied [`ConstructGate`].
pub struct MockFactory {
    next_id: AtomicU64,
    pub destroyed: Arc<AtomicUsize>,
    fail_names: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<ConstructGate>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        MockFactory {
            next_id: AtomicU64::new(1),
            destroyed: Arc::new(AtomicUsize::new(0)),
            fail_names: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_for(&self, name: &str) {
        self.fail_names.lock().unwrap().push(name.to_string());
    }

    /// Installs a gate that pauses the next `construct(name)` call right
    /// after it starts, until [`ConstructGate::release`] is called.
    pub fn gate_for(&self, name: &str) -> Arc<ConstructGate> {
        let gate = Arc::new(ConstructGate::new());
        self.gates
            .lock()
            .unwrap()
            .insert(name.to_string(), gate.clone());
        gate
    }
}

impl WriterFactory<Meta, MockWriter> for MockFactory {
    fn construct(&self, metadata: &Meta) -> Result<Arc<MockWriter>, ConstructionError> {
        if let Some(gate) = self.gates.lock().unwrap().get(&metadata.0).cloned() {
            gate.signal_entered();
            gate.wait_for_release();
        }
        if self.fail_names.lock().unwrap().iter().any(|n| n == &metadata.0) {
            return Err(ConstructionError::from(anyhow::anyhow!(
                "simulated construction failure for {}",
                metadata.0
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockWriter {
            name: metadata.0.clone(),
            id,
            hook: Mutex::new(None),
            destroyed: self.destroyed.clone(),
        }))
    }
}
