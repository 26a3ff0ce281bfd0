//! Script-visible globals: timers, `require`, `openFile` and `console`.

use crate::engine::{display_string, HostState, QuickJsEngine, QuickJsModules};
use async_runtime::{AsyncCompletion, ModuleError};
use core_types::{ErrorKind, TimerId};
use rquickjs::function::{Func, Rest};
use rquickjs::{Ctx, Exception, Object, Persistent, Value};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Installs every global into the context's global object.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, host: &Rc<HostState>) -> rquickjs::Result<()> {
    let global = ctx.globals();

    global.set(
        "setTimeout",
        Func::from({
            let host = Rc::clone(host);
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<i32> {
                set_timeout(&ctx, &host, &args.0)
            }
        }),
    )?;

    global.set(
        "clearTimeout",
        Func::from({
            let host = Rc::clone(host);
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
                clear_timeout(&ctx, &host, &args.0)
            }
        }),
    )?;

    global.set(
        "require",
        Func::from({
            let host = Rc::clone(host);
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                require(&ctx, &host, &args.0)
            }
        }),
    )?;

    global.set(
        "openFile",
        Func::from({
            let host = Rc::clone(host);
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<bool> {
                open_file(&ctx, &host, &args.0)
            }
        }),
    )?;

    let console = Object::new(ctx.clone())?;
    console.set(
        "log",
        Func::from(|args: Rest<Value<'js>>| println!("{}", join_display(&args.0))),
    )?;
    console.set(
        "error",
        Func::from(|args: Rest<Value<'js>>| eprintln!("{}", join_display(&args.0))),
    )?;
    global.set("console", console)?;

    debug!("globals installed");
    Ok(())
}

fn set_timeout<'js>(
    ctx: &Ctx<'js>,
    host: &HostState,
    args: &[Value<'js>],
) -> rquickjs::Result<i32> {
    let (callback, delay_ms) = match args {
        [callback, delay, ..] => match (callback.as_function(), delay.as_number()) {
            (Some(callback), Some(delay_ms)) => (callback.clone(), delay_ms),
            _ => return Err(invalid_arguments(ctx, "setTimeout(callback, delayMs)")),
        },
        _ => return Err(invalid_arguments(ctx, "setTimeout(callback, delayMs)")),
    };

    let callback = Persistent::save(ctx, callback);
    match host.scheduler.set_timeout(callback, timer_delay(delay_ms)) {
        Ok(id) => Ok(id.get() as i32),
        // Already logged by the scheduler; the script sees -1.
        Err(_) => Ok(-1),
    }
}

fn clear_timeout<'js>(
    ctx: &Ctx<'js>,
    host: &HostState,
    args: &[Value<'js>],
) -> rquickjs::Result<()> {
    let Some(handle) = args.first().and_then(Value::as_number) else {
        return Err(invalid_arguments(ctx, "clearTimeout(handle)"));
    };
    if (1.0..=f64::from(i32::MAX)).contains(&handle) {
        host.scheduler.clear_timeout(TimerId::new(handle as u32));
    }
    Ok(())
}

fn require<'js>(
    ctx: &Ctx<'js>,
    host: &HostState,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    let Some(identifier) = args.first().and_then(Value::as_string) else {
        return Err(invalid_arguments(ctx, "require(identifier)"));
    };
    let identifier = identifier.to_string()?;

    let modules = QuickJsModules::new(ctx);
    match host.modules.require(&modules, &identifier) {
        Ok(exports) => exports.restore(ctx),
        Err(err) => Err(raise_module_error(ctx, err)),
    }
}

/// `openFile(path, callback)`: reads the file on the I/O worker, then calls
/// `callback(null, text)` on the loop thread. A read failure or contents
/// that are not valid UTF-8 call `callback(error)` instead.
fn open_file<'js>(
    ctx: &Ctx<'js>,
    host: &HostState,
    args: &[Value<'js>],
) -> rquickjs::Result<bool> {
    let (path, callback) = match args {
        [path, callback, ..] => match (path.as_string(), callback.as_function()) {
            (Some(path), Some(callback)) => (path.to_string()?, callback.clone()),
            _ => return Err(invalid_arguments(ctx, "openFile(path, callback)")),
        },
        _ => return Err(invalid_arguments(ctx, "openFile(path, callback)")),
    };

    let Ok(slot) = host.scheduler.reserve_completion() else {
        return Ok(false);
    };
    let token = host
        .callbacks
        .borrow_mut()
        .insert(Persistent::save(ctx, callback));
    trace!(token, path = %path, "openFile submitted");

    let submitted = host.io.submit(move || {
        let contents = std::fs::read(&path);
        slot.complete(AsyncCompletion::new(
            "openFile",
            move |engine: &QuickJsEngine| engine.deliver_file(token, &path, contents),
        ));
    });
    if !submitted {
        warn!(token, "io worker unavailable, dropping openFile callback");
        host.callbacks.borrow_mut().remove(token);
    }
    Ok(submitted)
}

/// Turns a failed `require` into the exception the script sees.
///
/// Load and execution failures already carry a pending script exception,
/// which is rethrown as is. Missing modules and cycles become a
/// `ReferenceError`.
fn raise_module_error<'js>(ctx: &Ctx<'js>, err: ModuleError<rquickjs::Error>) -> rquickjs::Error {
    let kind = err.kind();
    match err {
        ModuleError::Load { identifier, error } | ModuleError::Execution { identifier, error } => {
            debug!(%kind, module = %identifier, "module failed");
            error
        }
        other => {
            warn!(%kind, "{other}");
            Exception::throw_reference(ctx, &other.to_string())
        }
    }
}

fn invalid_arguments(ctx: &Ctx<'_>, usage: &str) -> rquickjs::Error {
    trace!(kind = %ErrorKind::InvalidArgument, usage, "rejecting call");
    Exception::throw_type(ctx, &format!("Invalid arguments: expected {usage}"))
}

/// Converts a script delay to a duration. Negative, NaN and infinite
/// delays run as soon as possible; large ones saturate at `i32::MAX` ms.
fn timer_delay(delay_ms: f64) -> Duration {
    if delay_ms.is_finite() && delay_ms > 0.0 {
        Duration::from_millis(delay_ms.min(f64::from(i32::MAX)) as u64)
    } else {
        Duration::ZERO
    }
}

fn join_display(args: &[Value<'_>]) -> String {
    args.iter()
        .map(display_string)
        .collect::<Vec<_>>()
        .join(" ")
}
