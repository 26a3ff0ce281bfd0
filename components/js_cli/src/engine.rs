//! QuickJS binding for the event loop and the module loader.
//!
//! [`QuickJsEngine`] owns one QuickJS runtime and context plus the host
//! state shared with the installed globals. Script callbacks are held as
//! [`Persistent`] handles; they are released in [`Drop`] before the
//! context and runtime go away.

use crate::error::CliResult;
use crate::globals;
use crate::io::IoWorker;
use async_runtime::{ModuleHost, ModuleLoader, RuntimeConfig, Scheduler};
use core_types::{MicrotaskStatus, ScriptEngine, ScriptException};
use rquickjs::convert::Coerced;
use rquickjs::{
    qjs, CatchResultExt, CaughtError, Context, Ctx, Exception, FromJs, Function, Object,
    Persistent, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::io;
use std::rc::Rc;
use tracing::{debug, warn};

/// A script function kept alive outside any context scope.
pub type ScriptFunction = Persistent<Function<'static>>;

/// The `module.exports` value of an evaluated module.
pub type ModuleExports = Persistent<Value<'static>>;

/// Script callbacks waiting for a native result, keyed by token.
///
/// Only the token crosses to the I/O worker; the function itself never
/// leaves the loop thread.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    next_token: u64,
    entries: HashMap<u64, ScriptFunction>,
}

impl CallbackRegistry {
    pub(crate) fn insert(&mut self, callback: ScriptFunction) -> u64 {
        self.next_token += 1;
        self.entries.insert(self.next_token, callback);
        self.next_token
    }

    pub(crate) fn remove(&mut self, token: u64) -> Option<ScriptFunction> {
        self.entries.remove(&token)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// State shared between the engine and the globals it installs.
pub(crate) struct HostState {
    pub(crate) scheduler: Rc<Scheduler<QuickJsEngine>>,
    pub(crate) modules: ModuleLoader<ModuleExports>,
    pub(crate) callbacks: RefCell<CallbackRegistry>,
    pub(crate) io: IoWorker,
}

impl HostState {
    fn release_script_values(&self) {
        self.scheduler.clear();
        self.modules.clear();
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        debug!(callbacks = callbacks.len(), "released pending script callbacks");
    }
}

/// One QuickJS runtime with the loop globals installed.
pub struct QuickJsEngine {
    // Field order matters: host values drop before the context, the
    // context before the runtime.
    host: Rc<HostState>,
    context: Context,
    runtime: rquickjs::Runtime,
}

impl QuickJsEngine {
    /// Creates a runtime, a full context and installs the globals.
    ///
    /// # Errors
    ///
    /// Fails if QuickJS cannot allocate the runtime or context, or if the
    /// I/O worker thread cannot be spawned.
    pub fn new(config: RuntimeConfig) -> CliResult<Self> {
        let runtime = rquickjs::Runtime::new()?;
        let context = Context::full(&runtime)?;
        let host = Rc::new(HostState {
            scheduler: Rc::new(Scheduler::new(config)),
            modules: ModuleLoader::new(),
            callbacks: RefCell::default(),
            io: IoWorker::spawn()?,
        });
        context.with(|ctx| globals::install(&ctx, &host))?;
        Ok(Self {
            host,
            context,
            runtime,
        })
    }

    /// The scheduler the installed globals feed.
    pub fn scheduler(&self) -> &Rc<Scheduler<QuickJsEngine>> {
        &self.host.scheduler
    }

    /// The script context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Identifiers of every module evaluated so far.
    pub fn loaded_modules(&self) -> Vec<String> {
        let cache = self.host.modules.cache();
        let mut identifiers: Vec<String> = cache.identifiers().map(str::to_string).collect();
        identifiers.sort();
        identifiers
    }

    /// Number of `openFile` callbacks still waiting for their result.
    pub fn pending_callbacks(&self) -> usize {
        self.host.callbacks.borrow().len()
    }

    /// Invokes the callback registered under `token` with a file result.
    pub(crate) fn deliver_file(
        &self,
        token: u64,
        path: &str,
        contents: io::Result<Vec<u8>>,
    ) -> Result<(), ScriptException> {
        let registered = self.host.callbacks.borrow_mut().remove(token);
        let Some(callback) = registered else {
            warn!(token, "no callback registered for file completion");
            return Ok(());
        };

        self.context.with(|ctx| {
            let function = callback
                .restore(&ctx)
                .map_err(|err| ScriptException::new(err.to_string()))?;
            let text = contents.and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
            });
            let outcome = match text {
                Ok(text) => function.call::<_, ()>((Value::new_null(ctx.clone()), text)),
                Err(err) => new_error(&ctx, format!("openFile: {path}: {err}"))
                    .and_then(|error| function.call::<_, ()>((error,))),
            };
            outcome
                .catch(&ctx)
                .map_err(|caught| ScriptException::new(describe_caught(caught)))
        })
    }
}

impl ScriptEngine for QuickJsEngine {
    type Callback = ScriptFunction;

    fn call(&self, callback: ScriptFunction) -> Result<(), ScriptException> {
        self.context.with(|ctx| {
            let function = callback
                .restore(&ctx)
                .map_err(|err| ScriptException::new(err.to_string()))?;
            function
                .call::<_, ()>(())
                .catch(&ctx)
                .map_err(|caught| ScriptException::new(describe_caught(caught)))
        })
    }

    fn run_microtask(&self) -> Result<MicrotaskStatus, ScriptException> {
        match self.runtime.execute_pending_job() {
            Ok(true) => Ok(MicrotaskStatus::Ran),
            Ok(false) => Ok(MicrotaskStatus::Exhausted),
            Err(_) => {
                let message = self.context.with(|ctx| describe_value(&ctx.catch()));
                Err(ScriptException::new(message))
            }
        }
    }
}

impl Drop for QuickJsEngine {
    fn drop(&mut self) {
        self.host.release_script_values();
    }
}

impl fmt::Debug for QuickJsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickJsEngine")
            .field("scheduler", &self.host.scheduler)
            .field("modules", &self.host.modules)
            .finish_non_exhaustive()
    }
}

/// Evaluates modules inside the context of the `require` call that asked
/// for them.
pub(crate) struct QuickJsModules<'a, 'js> {
    ctx: &'a Ctx<'js>,
}

impl<'a, 'js> QuickJsModules<'a, 'js> {
    pub(crate) fn new(ctx: &'a Ctx<'js>) -> Self {
        Self { ctx }
    }
}

impl<'js> ModuleHost for QuickJsModules<'_, 'js> {
    type Wrapper = Function<'js>;
    type Exports = ModuleExports;
    type Error = rquickjs::Error;

    fn compile_wrapper(&self, identifier: &str, wrapped: &str) -> rquickjs::Result<Function<'js>> {
        eval_named(self.ctx, wrapped, identifier)
    }

    fn invoke_wrapper(
        &self,
        _identifier: &str,
        wrapper: Function<'js>,
    ) -> rquickjs::Result<ModuleExports> {
        let module = Object::new(self.ctx.clone())?;
        let exports = Object::new(self.ctx.clone())?;
        module.set("exports", exports.clone())?;
        wrapper.call::<_, ()>((module.clone(), exports))?;
        let exports: Value<'js> = module.get("exports")?;
        Ok(Persistent::save(self.ctx, exports))
    }
}

/// Evaluates `source` as a strict global script, recording `filename` in
/// its stack frames.
///
/// Same flags as [`Ctx::eval`], which always names its input
/// `eval_script`. A thrown value is left pending for
/// [`CatchResultExt::catch`].
pub(crate) fn eval_named<'js, V: FromJs<'js>>(
    ctx: &Ctx<'js>,
    source: &str,
    filename: &str,
) -> rquickjs::Result<V> {
    let source = CString::new(source)?;
    let filename = CString::new(filename)?;
    let flags = (qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_STRICT) as i32;
    // SAFETY: both strings are NUL-terminated and outlive the call. JS_Eval
    // returns an owned value of this context's runtime.
    let value = unsafe {
        let raw = qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            source.as_ptr(),
            source.as_bytes().len() as _,
            filename.as_ptr(),
            flags,
        );
        Value::from_raw(ctx.clone(), raw)
    };
    if value.is_exception() {
        return Err(rquickjs::Error::Exception);
    }
    V::from_js(ctx, value)
}

/// Calls the global `Error` constructor with `message`.
pub(crate) fn new_error<'js>(ctx: &Ctx<'js>, message: String) -> rquickjs::Result<Value<'js>> {
    let constructor: Function<'js> = ctx.globals().get("Error")?;
    constructor.call((message,))
}

/// Renders a caught script failure for diagnostics.
pub(crate) fn describe_caught(caught: CaughtError<'_>) -> String {
    match caught {
        CaughtError::Exception(exception) => describe_exception(&exception),
        CaughtError::Value(value) => describe_value(&value),
        CaughtError::Error(error) => error.to_string(),
    }
}

/// Diagnostic string of a thrown value; exceptions carry their stack.
pub(crate) fn describe_value(value: &Value<'_>) -> String {
    match value.as_exception() {
        Some(exception) => describe_exception(exception),
        None => display_string(value),
    }
}

/// `String(value)`, or the debug form when coercion itself throws.
pub(crate) fn display_string(value: &Value<'_>) -> String {
    value
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| format!("{value:?}"))
}

fn describe_exception(exception: &Exception<'_>) -> String {
    let name: String = exception
        .get("name")
        .unwrap_or_else(|_| "Error".to_string());
    let headline = match exception.message() {
        Some(message) if !message.is_empty() => format!("{name}: {message}"),
        _ => name,
    };
    match exception.stack() {
        Some(stack) if !stack.trim().is_empty() => format!("{headline}\n{}", stack.trim_end()),
        _ => headline,
    }
}
