//! CommonJS-style module cache and loader.
//!
//! `require(id)` looks `id` up in the cache by exact string match. On a miss
//! the file at `id` is read, wrapped in `(function(module, exports) { ... })`
//! so its top-level declarations stay out of the global scope, compiled, and
//! called with a fresh `module` object. Whatever `module.exports` holds once
//! the body returns is cached and returned.
//!
//! Failed loads are never cached: a module that fails to compile or throws
//! is loaded from scratch by the next `require`.
//!
//! Identifiers are not normalized. `"./a.js"` and `"a.js"` are two modules.

use core_types::ErrorKind;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::{debug, trace};

/// Wraps module source in the function expression the loader compiles.
///
/// # Examples
///
/// ```
/// use async_runtime::wrap_module_source;
///
/// let wrapped = wrap_module_source("exports.answer = 42;");
/// assert_eq!(wrapped, "(function(module, exports) { exports.answer = 42;\n})");
/// ```
pub fn wrap_module_source(source: &str) -> String {
    format!("(function(module, exports) {{ {source}\n}})")
}

/// The engine side of module loading.
///
/// The loader decides *when* to read, compile and run a module; the host
/// knows *how*. Hosts run on the script thread and may call back into the
/// loader (a module body calling `require`).
pub trait ModuleHost {
    /// A compiled wrapper function.
    type Wrapper;
    /// A shared handle to a module's exports. Cloning shares the value.
    type Exports: Clone;
    /// An engine error (typically a pending script exception).
    type Error;

    /// Reads module source. Defaults to reading `identifier` as a file path.
    fn read_source(&self, identifier: &str) -> io::Result<String> {
        std::fs::read_to_string(identifier)
    }

    /// Compiles the wrapped source into a callable wrapper.
    fn compile_wrapper(
        &self,
        identifier: &str,
        wrapped_source: &str,
    ) -> Result<Self::Wrapper, Self::Error>;

    /// Builds a fresh `module` object with an `exports` sub-object, calls the
    /// wrapper with `(module, module.exports)`, and returns the final value
    /// of `module.exports`.
    fn invoke_wrapper(
        &self,
        identifier: &str,
        wrapper: Self::Wrapper,
    ) -> Result<Self::Exports, Self::Error>;
}

/// Why a `require` failed.
#[derive(Debug, Error)]
pub enum ModuleError<E> {
    /// The identifier could not be read as a file
    #[error("Module not found: {identifier}")]
    NotFound {
        /// The identifier passed to `require`
        identifier: String,
        /// The underlying read failure
        #[source]
        source: io::Error,
    },

    /// The module body failed to compile
    #[error("Failed to compile module: {identifier}")]
    Load {
        /// The identifier passed to `require`
        identifier: String,
        /// The engine error
        error: E,
    },

    /// The module body threw
    #[error("Module threw during evaluation: {identifier}")]
    Execution {
        /// The identifier passed to `require`
        identifier: String,
        /// The engine error
        error: E,
    },

    /// The module is already executing further up the require chain
    #[error("Cyclic require: {}", .chain.join(" -> "))]
    Cycle {
        /// Identifiers from the outermost executing module to the repeated one
        chain: Vec<String>,
    },
}

impl<E> ModuleError<E> {
    /// The taxonomy category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::NotFound { .. } => ErrorKind::ModuleNotFound,
            ModuleError::Load { .. } => ErrorKind::ModuleLoadError,
            ModuleError::Execution { .. } => ErrorKind::ModuleExecutionError,
            ModuleError::Cycle { .. } => ErrorKind::ModuleCycle,
        }
    }

    /// The engine error carried by load and execution failures.
    pub fn into_engine_error(self) -> Option<E> {
        match self {
            ModuleError::Load { error, .. } | ModuleError::Execution { error, .. } => Some(error),
            ModuleError::NotFound { .. } | ModuleError::Cycle { .. } => None,
        }
    }
}

/// Exports of successfully evaluated modules, keyed by identifier.
///
/// Entries live as long as the cache and are never replaced.
pub struct ModuleCache<X> {
    entries: HashMap<String, X>,
}

impl<X> ModuleCache<X> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns a shared handle to the cached exports of `identifier`.
    pub fn get(&self, identifier: &str) -> Option<X>
    where
        X: Clone,
    {
        self.entries.get(identifier).cloned()
    }

    /// Caches `exports` under `identifier` unless an entry already exists.
    ///
    /// Returns false (and drops `exports`) if the identifier was cached.
    pub fn insert(&mut self, identifier: impl Into<String>, exports: X) -> bool {
        match self.entries.entry(identifier.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(exports);
                true
            }
        }
    }

    /// Returns true if `identifier` is cached.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached identifiers, in no particular order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<X> Default for ModuleCache<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for ModuleCache<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Resolves `require` calls against a [`ModuleCache`].
///
/// # Examples
///
/// ```
/// use async_runtime::{ModuleHost, ModuleLoader};
/// use std::cell::Cell;
/// use std::io;
/// use std::rc::Rc;
///
/// struct Host {
///     runs: Cell<u32>,
/// }
///
/// impl ModuleHost for Host {
///     type Wrapper = ();
///     type Exports = Rc<u32>;
///     type Error = String;
///
///     fn read_source(&self, _: &str) -> io::Result<String> {
///         Ok("module.exports = 7;".to_string())
///     }
///     fn compile_wrapper(&self, _: &str, _: &str) -> Result<(), String> {
///         Ok(())
///     }
///     fn invoke_wrapper(&self, _: &str, _: ()) -> Result<Rc<u32>, String> {
///         self.runs.set(self.runs.get() + 1);
///         Ok(Rc::new(7))
///     }
/// }
///
/// let host = Host { runs: Cell::new(0) };
/// let loader = ModuleLoader::new();
/// let first = loader.require(&host, "seven.js").unwrap();
/// let second = loader.require(&host, "seven.js").unwrap();
///
/// assert!(Rc::ptr_eq(&first, &second));
/// assert_eq!(host.runs.get(), 1);
/// ```
pub struct ModuleLoader<X> {
    cache: RefCell<ModuleCache<X>>,
    executing: RefCell<Vec<String>>,
}

impl<X: Clone> ModuleLoader<X> {
    /// Creates a loader with an empty cache.
    pub fn new() -> Self {
        Self {
            cache: RefCell::new(ModuleCache::new()),
            executing: RefCell::new(Vec::new()),
        }
    }

    /// Returns the exports of `identifier`, evaluating the module on first
    /// use.
    ///
    /// No borrow of the loader is held while the host runs, so module bodies
    /// may `require` other modules.
    ///
    /// # Errors
    ///
    /// - [`ModuleError::NotFound`] if the source cannot be read
    /// - [`ModuleError::Load`] if the wrapper fails to compile
    /// - [`ModuleError::Execution`] if the body throws
    /// - [`ModuleError::Cycle`] if `identifier` is already executing
    ///
    /// Nothing is cached on any error path.
    pub fn require<H>(&self, host: &H, identifier: &str) -> Result<X, ModuleError<H::Error>>
    where
        H: ModuleHost<Exports = X>,
    {
        let cached = self.cache.borrow().get(identifier);
        if let Some(exports) = cached {
            trace!(module = identifier, "module cache hit");
            return Ok(exports);
        }

        let _frame = self.enter(identifier)?;

        let source = host
            .read_source(identifier)
            .map_err(|source| ModuleError::NotFound {
                identifier: identifier.to_string(),
                source,
            })?;

        let wrapped = wrap_module_source(&source);
        let wrapper = host
            .compile_wrapper(identifier, &wrapped)
            .map_err(|error| ModuleError::Load {
                identifier: identifier.to_string(),
                error,
            })?;

        let exports = host
            .invoke_wrapper(identifier, wrapper)
            .map_err(|error| ModuleError::Execution {
                identifier: identifier.to_string(),
                error,
            })?;

        self.cache
            .borrow_mut()
            .insert(identifier, exports.clone());
        debug!(module = identifier, "module evaluated and cached");
        Ok(exports)
    }

    /// Returns true if `identifier` has been evaluated and cached.
    pub fn is_cached(&self, identifier: &str) -> bool {
        self.cache.borrow().contains(identifier)
    }

    /// Borrows the cache.
    pub fn cache(&self) -> Ref<'_, ModuleCache<X>> {
        self.cache.borrow()
    }

    /// Drops every cached export handle.
    ///
    /// Only meant for engine teardown; a live runtime keeps its entries.
    pub fn clear(&self) {
        let cache = std::mem::take(&mut *self.cache.borrow_mut());
        debug!(modules = cache.len(), "module cache released");
    }

    /// Identifiers currently executing, outermost first.
    pub fn executing(&self) -> Vec<String> {
        self.executing.borrow().clone()
    }

    fn enter<E>(&self, identifier: &str) -> Result<ExecutingFrame<'_>, ModuleError<E>> {
        let mut executing = self.executing.borrow_mut();
        if let Some(start) = executing.iter().position(|id| id == identifier) {
            let mut chain: Vec<String> = executing[start..].to_vec();
            chain.push(identifier.to_string());
            return Err(ModuleError::Cycle { chain });
        }
        executing.push(identifier.to_string());
        Ok(ExecutingFrame {
            executing: &self.executing,
        })
    }
}

impl<X: Clone> Default for ModuleLoader<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for ModuleLoader<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("cache", &*self.cache.borrow())
            .field("executing", &*self.executing.borrow())
            .finish()
    }
}

/// Pops the executing stack on every exit path of `require`.
struct ExecutingFrame<'a> {
    executing: &'a RefCell<Vec<String>>,
}

impl Drop for ExecutingFrame<'_> {
    fn drop(&mut self) {
        self.executing.borrow_mut().pop();
    }
}
