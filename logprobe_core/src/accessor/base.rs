//! The capability accessor.
//!
//! A capability accessor binds one foreign object to the application it came
//! from and exposes two verbs: `has_capability` to probe for a method shape,
//! and `invoke` to call it inside the object's own context.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{trace, warn};

use super::error::InvokeError;
use crate::foreign::{
    ForeignClass, ForeignValue, HostedApplication, IsolatedContext, ObjectIdentity, ObjectRef,
    ValueKind,
};

/// Default deadline for one foreign call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on any walk up a logger hierarchy.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 64;

/// Limits applied to foreign calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Deadline for one call; `None` calls inline on the current thread.
    pub timeout: Option<Duration>,

    /// Maximum number of parent hops before a walk is abandoned.
    pub max_hierarchy_depth: usize,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_CALL_TIMEOUT),
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }
}

impl CallPolicy {
    /// Inline calls with no deadline.
    pub fn inline() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }
}

/// The hosted application an accessor belongs to.
#[derive(Debug)]
pub struct OwningApplication {
    name: String,
    work_dir: PathBuf,
    context: Arc<dyn IsolatedContext>,
}

impl OwningApplication {
    pub fn new(
        name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        context: Arc<dyn IsolatedContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            work_dir: work_dir.into(),
            context,
        })
    }

    /// Tag a running hosted application. `None` when it has no live context.
    pub fn from_hosted(app: &HostedApplication) -> Option<Arc<Self>> {
        app.live_context()
            .map(|ctx| Self::new(app.name.clone(), app.work_dir.clone(), ctx.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn context(&self) -> &Arc<dyn IsolatedContext> {
        &self.context
    }

    /// Resolve a foreign-reported path against the working directory.
    pub fn resolve_path(&self, raw: impl AsRef<Path>) -> PathBuf {
        let raw = raw.as_ref();
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.work_dir.join(raw)
        }
    }
}

/// A foreign object bound to its owning application.
#[derive(Debug, Clone)]
pub struct CapabilityAccessor {
    target: ObjectRef,
    application: Arc<OwningApplication>,
    policy: CallPolicy,
}

impl CapabilityAccessor {
    /// Bind a foreign object. Performs no validation.
    pub fn bind(
        target: ObjectRef,
        application: Arc<OwningApplication>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            target,
            application,
            policy,
        }
    }

    /// Bind another object of the same application under the same policy.
    pub fn rebind(&self, target: ObjectRef) -> Self {
        Self::bind(target, self.application.clone(), self.policy)
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn application(&self) -> &Arc<OwningApplication> {
        &self.application
    }

    pub fn policy(&self) -> CallPolicy {
        self.policy
    }

    pub fn identity(&self) -> ObjectIdentity {
        self.target.identity()
    }

    /// Check whether the target has a method accepting `arg_types`.
    pub fn has_capability(&self, method: &str, arg_types: &[ValueKind]) -> bool {
        self.target
            .signatures(method)
            .iter()
            .any(|sig| sig.accepts(arg_types))
    }

    /// Invoke `method` on the target inside its own context.
    pub fn invoke(
        &self,
        method: &str,
        arg_types: &[ValueKind],
        args: Vec<ForeignValue>,
    ) -> Result<ForeignValue, InvokeError> {
        let overloads = self.target.signatures(method);
        if overloads.is_empty() {
            return Err(InvokeError::NotFound {
                type_name: self.target.type_info().name.clone(),
                method: method.to_string(),
            });
        }
        if !overloads.iter().any(|sig| sig.accepts(arg_types)) {
            let shape: Vec<String> = arg_types.iter().map(ToString::to_string).collect();
            return Err(InvokeError::Mismatch {
                method: method.to_string(),
                detail: format!("no overload accepts ({})", shape.join(", ")),
            });
        }
        if args.len() != arg_types.len()
            || !args.iter().zip(arg_types).all(|(v, k)| v.conforms_to(k))
        {
            return Err(InvokeError::Mismatch {
                method: method.to_string(),
                detail: "argument values do not match the declared types".to_string(),
            });
        }

        trace!(
            "{}: invoking {}.{} ({} args)",
            self.application.name(),
            self.target.type_info().name,
            method,
            args.len()
        );
        self.dispatch(method, args)
    }

    /// Invoke a no-argument method.
    pub fn call(&self, method: &str) -> Result<ForeignValue, InvokeError> {
        self.invoke(method, &[], Vec::new())
    }

    /// Invoke a method taking one string.
    pub fn call_with_str(&self, method: &str, arg: &str) -> Result<ForeignValue, InvokeError> {
        self.invoke(method, &[ValueKind::Str], vec![ForeignValue::from(arg)])
    }

    /// Invoke a no-argument method returning an object or null.
    pub fn call_object(&self, method: &str) -> Result<Option<ObjectRef>, InvokeError> {
        let value = self.call(method)?;
        self.expect_object(method, value)
    }

    /// Invoke a no-argument method returning a string or null.
    pub fn call_string(&self, method: &str) -> Result<Option<String>, InvokeError> {
        match self.call(method)? {
            ForeignValue::Null => Ok(None),
            ForeignValue::Str(s) => Ok(Some(s)),
            other => Err(self.unexpected(method, "String", &other)),
        }
    }

    /// Invoke a no-argument method returning a list; null reads as empty.
    pub fn call_list(&self, method: &str) -> Result<Vec<ForeignValue>, InvokeError> {
        match self.call(method)? {
            ForeignValue::Null => Ok(Vec::new()),
            ForeignValue::List(items) => Ok(items),
            other => Err(self.unexpected(method, "List", &other)),
        }
    }

    /// Narrow a returned value to an object reference.
    pub fn expect_object(
        &self,
        method: &str,
        value: ForeignValue,
    ) -> Result<Option<ObjectRef>, InvokeError> {
        match value {
            ForeignValue::Null => Ok(None),
            ForeignValue::Object(obj) => Ok(Some(obj)),
            other => Err(self.unexpected(method, "Object", &other)),
        }
    }

    /// Load a class through the owning application's context.
    pub fn load_class(&self, name: &str) -> Option<ForeignClass> {
        self.application.context().load_class(name)
    }

    /// Invoke a static method of `class`.
    pub fn invoke_static(
        &self,
        class: &ForeignClass,
        method: &str,
        arg_types: &[ValueKind],
        args: Vec<ForeignValue>,
    ) -> Result<ForeignValue, InvokeError> {
        self.rebind(class.statics().clone())
            .invoke(method, arg_types, args)
    }

    /// Check the target against a class loaded by its own context.
    pub fn is_instance_of(&self, class_name: &str) -> bool {
        self.load_class(class_name)
            .map(|class| class.is_instance(&self.target))
            .unwrap_or(false)
    }

    fn unexpected(&self, method: &str, wanted: &str, got: &ForeignValue) -> InvokeError {
        InvokeError::Mismatch {
            method: method.to_string(),
            detail: format!("expected {} but the call returned {:?}", wanted, got),
        }
    }

    fn dispatch(&self, method: &str, args: Vec<ForeignValue>) -> Result<ForeignValue, InvokeError> {
        let limit = match self.policy.timeout {
            Some(limit) => limit,
            None => return guarded_call(&self.target, method, &args),
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let target = self.target.clone();
        let name = method.to_string();
        let spawned = thread::Builder::new()
            .name(format!("foreign-call-{}", method))
            .spawn(move || {
                // The receiver may have given up already.
                let _ = tx.send(guarded_call(&target, &name, &args));
            });
        if let Err(e) = spawned {
            return Err(InvokeError::ForeignFault {
                method: method.to_string(),
                message: format!("could not start call thread: {}", e),
            });
        }

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{}: {}.{} exceeded its {:?} deadline",
                    self.application.name(),
                    self.target.type_info().name,
                    method,
                    limit
                );
                Err(InvokeError::TimedOut {
                    method: method.to_string(),
                    millis: limit.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(InvokeError::ForeignFault {
                method: method.to_string(),
                message: "call thread exited without a result".to_string(),
            }),
        }
    }
}

fn guarded_call(
    target: &ObjectRef,
    method: &str,
    args: &[ForeignValue],
) -> Result<ForeignValue, InvokeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| target.call(method, args))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(fault)) => Err(InvokeError::ForeignFault {
            method: method.to_string(),
            message: fault.message,
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "foreign call panicked".to_string());
            Err(InvokeError::ForeignFault {
                method: method.to_string(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::{DynamicContext, ForeignFault};

    fn fixture(policy: CallPolicy) -> (Arc<DynamicContext>, CapabilityAccessor) {
        let ctx = DynamicContext::new("shop");
        let target = ctx
            .object("demo.Registry")
            .constant("getName", "registry")
            .method("lookup", vec![ValueKind::Str], |args| {
                Ok(match args[0].as_str() {
                    Some("known") => ForeignValue::from("found"),
                    _ => ForeignValue::Null,
                })
            })
            .method("explode", vec![], |_| {
                Err(ForeignFault::new("java.lang.RuntimeException: kaboom"))
            })
            .method("panic", vec![], |_| panic!("binding bug"))
            .method("hang", vec![], |_| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(ForeignValue::Null)
            })
            .build();
        let app = OwningApplication::new("shop", "/apps/shop", ctx.clone());
        (ctx, CapabilityAccessor::bind(target, app, policy))
    }

    #[test]
    fn test_invoke_success_and_null() {
        let (_ctx, accessor) = fixture(CallPolicy::default());
        assert_eq!(
            accessor.call_with_str("lookup", "known").unwrap().as_str(),
            Some("found")
        );
        assert!(accessor.call_with_str("lookup", "other").unwrap().is_null());
        assert_eq!(accessor.call_string("getName").unwrap().as_deref(), Some("registry"));
    }

    #[test]
    fn test_invoke_not_found_and_mismatch() {
        let (_ctx, accessor) = fixture(CallPolicy::inline());
        assert!(matches!(
            accessor.call("missing"),
            Err(InvokeError::NotFound { .. })
        ));
        assert!(matches!(
            accessor.invoke("lookup", &[ValueKind::Int], vec![ForeignValue::Int(1)]),
            Err(InvokeError::Mismatch { .. })
        ));
        assert!(matches!(
            accessor.invoke("lookup", &[ValueKind::Str], vec![ForeignValue::Int(1)]),
            Err(InvokeError::Mismatch { .. })
        ));
        assert!(accessor.has_capability("lookup", &[ValueKind::Str]));
        assert!(!accessor.has_capability("lookup", &[]));
    }

    #[test]
    fn test_foreign_fault_carries_message() {
        let (_ctx, accessor) = fixture(CallPolicy::inline());
        match accessor.call("explode") {
            Err(InvokeError::ForeignFault { message, .. }) => assert!(message.contains("kaboom")),
            other => panic!("unexpected: {:?}", other),
        }
        match accessor.call("panic") {
            Err(InvokeError::ForeignFault { message, .. }) => {
                assert!(message.contains("binding bug"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_deadline() {
        let policy = CallPolicy {
            timeout: Some(Duration::from_millis(20)),
            ..CallPolicy::default()
        };
        let (_ctx, accessor) = fixture(policy);
        assert!(matches!(
            accessor.call("hang"),
            Err(InvokeError::TimedOut { millis: 20, .. })
        ));
        assert!(accessor.call("getName").is_ok());
    }

    #[test]
    fn test_stopped_context() {
        let (ctx, accessor) = fixture(CallPolicy::default());
        ctx.stop();
        assert!(matches!(
            accessor.call("getName"),
            Err(InvokeError::ForeignFault { .. })
        ));
    }

    #[test]
    fn test_resolve_path() {
        let (_ctx, accessor) = fixture(CallPolicy::default());
        let app = accessor.application();
        assert_eq!(
            app.resolve_path("logs/app.log"),
            PathBuf::from("/apps/shop/logs/app.log")
        );
        assert_eq!(app.resolve_path("/var/log/x.log"), PathBuf::from("/var/log/x.log"));
    }
}
