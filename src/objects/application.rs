//! `Application`: process-wide variables shared by every request.
//!
//! `Application.Lock` gives the calling request exclusive write access until
//! it calls `Unlock` (or its object is dropped at the end of the run). Other
//! requests block on writes and on their own `Lock` meanwhile; reads never block.

use super::contents::{call_common, item, Contents, ContentsObject};
use crate::eval::EvalError;
use crate::extension::{arg, check_args, ExtensionObject, ObjectRef};
use crate::value::{StoredValue, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
pub struct ApplicationState {
    values: RwLock<Vec<(String, StoredValue)>>,
    /// Token of the request holding `Application.Lock`
    owner: Mutex<Option<u64>>,
    released: Condvar,
}

impl ApplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| Value::from(v))
    }

    pub fn keys(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.iter().map(|(k, _)| k.clone()).collect()
    }

    fn owner(&self) -> MutexGuard<'_, Option<u64>> {
        self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until nobody but `token` holds the lock.
    fn wait_turn(&self, token: u64) -> MutexGuard<'_, Option<u64>> {
        let mut owner = self.owner();
        while matches!(*owner, Some(t) if t != token) {
            owner = self.released.wait(owner).unwrap_or_else(|e| e.into_inner());
        }
        owner
    }

    fn write(&self, token: u64, f: impl FnOnce(&mut Vec<(String, StoredValue)>)) {
        let _turn = self.wait_turn(token);
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        f(&mut values);
    }

    fn acquire(&self, token: u64) {
        let mut owner = self.wait_turn(token);
        *owner = Some(token);
    }

    fn release(&self, token: u64) {
        let mut owner = self.owner();
        if *owner == Some(token) {
            *owner = None;
            self.released.notify_all();
        }
    }
}

/// One request's view of the shared state.
#[derive(Clone)]
pub struct ApplicationHandle {
    state: Arc<ApplicationState>,
    token: u64,
}

impl ApplicationHandle {
    pub fn new(state: Arc<ApplicationState>) -> Self {
        ApplicationHandle {
            state,
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Contents for ApplicationHandle {
    fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
        let stored = StoredValue::try_from(&value)?;
        self.state.write(self.token, |values| {
            match values.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
                Some(entry) => entry.1 = stored,
                None => values.push((key.to_string(), stored)),
            }
        });
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.state
            .write(self.token, |values| values.retain(|(k, _)| !k.eq_ignore_ascii_case(key)));
    }

    fn clear(&self) {
        self.state.write(self.token, |values| values.clear());
    }

    fn keys(&self) -> Vec<String> {
        self.state.keys()
    }
}

pub struct ApplicationObject {
    handle: ApplicationHandle,
    /// Nested `Lock` calls not yet matched by `Unlock`
    depth: usize,
}

impl ApplicationObject {
    pub fn new(state: Arc<ApplicationState>) -> Self {
        ApplicationObject {
            handle: ApplicationHandle::new(state),
            depth: 0,
        }
    }
}

impl Drop for ApplicationObject {
    fn drop(&mut self) {
        if self.depth > 0 {
            self.handle.state.release(self.handle.token);
        }
    }
}

impl ExtensionObject for ApplicationObject {
    fn type_name(&self) -> &str {
        "Application"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "LOCK" => {
                if self.depth == 0 {
                    self.handle.state.acquire(self.handle.token);
                }
                self.depth += 1;
                Ok(Value::Empty)
            }
            "UNLOCK" => {
                if self.depth > 0 {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.handle.state.release(self.handle.token);
                    }
                }
                Ok(Value::Empty)
            }
            "CONTENTS" if args.is_empty() => Ok(Value::Object(ObjectRef::native(
                ContentsObject::new(self.handle.clone(), "Application.Contents"),
            ))),
            "CONTENTS" => {
                check_args(name, args, 1, 1)?;
                item(&self.handle, &args[0])
            }
            _ => call_common(&self.handle, name, args)
                .unwrap_or_else(|| Err(EvalError::NotSupported(format!("Application.{}", name)))),
        }
    }

    fn set_property(&mut self, name: &str, args: &[Value], value: Value) -> Result<(), EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "" | "CONTENTS" | "ITEM" => {
                check_args(name, args, 1, 1)?;
                self.handle.set(&arg(args, 0).to_vb_string()?, value)
            }
            _ => Err(EvalError::NotSupported(format!("Application.{}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_values_are_shared_between_objects() {
        let state = Arc::new(ApplicationState::new());
        let mut a = ApplicationObject::new(Arc::clone(&state));
        let mut b = ApplicationObject::new(Arc::clone(&state));
        a.set_property("", &[Value::str("Hits")], Value::Integer(3)).unwrap();
        let v = b.get_property("", &[Value::str("hits")]).unwrap();
        assert!(matches!(v, Value::Integer(3)));
        b.call_method("Remove", &[Value::str("HITS")]).unwrap();
        assert!(state.get("hits").is_none());
    }

    #[test]
    fn test_lock_blocks_other_writers_until_drop() {
        let state = Arc::new(ApplicationState::new());
        let mut holder = ApplicationObject::new(Arc::clone(&state));
        holder.call_method("Lock", &[]).unwrap();
        holder.call_method("Lock", &[]).unwrap();
        holder.call_method("Unlock", &[]).unwrap();

        let writer_state = Arc::clone(&state);
        let writer = thread::spawn(move || {
            let handle = ApplicationHandle::new(writer_state);
            handle.set("k", Value::str("late")).unwrap();
        });
        holder.set_property("", &[Value::str("k")], Value::str("first")).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(state.get("k").unwrap().to_string(), "first");

        drop(holder);
        writer.join().unwrap();
        assert_eq!(state.get("k").unwrap().to_string(), "late");
    }
}
