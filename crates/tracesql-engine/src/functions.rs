//! User-defined scalar functions.
//!
//! Registration is two-phase: `reserve` installs the SQLite function under
//! its name before the body is prepared, so the body may call the function
//! recursively; `finalize` then validates the body or replaces the previous
//! definition atomically. Invocation binds arguments through the recorded
//! bind order, steps a pooled body statement (a fresh one is prepared when
//! the pool is empty, which is what makes recursion work), and reports "no
//! row" with the reserved pointer sentinel.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_int, c_void, CString};
use std::rc::{Rc, Weak};

use rusqlite::ffi;
use tracesql_core::{Error, Result, SqlSource, SqlValue};
use tracesql_sqlite::{ffi_util, PreparedStatement, SqliteEngine};

use crate::prototype::{Prototype, ScalarType};

/// A finalized function body and everything needed to run it.
struct FunctionDefinition {
    prototype: Prototype,
    return_type: ScalarType,
    body: SqlSource,
    /// Entry `i` is the prototype argument bound at parameter slot `i + 1`.
    binding_order: Vec<usize>,
}

/// Shared state of one created function, keyed by (lowercase name, arity).
/// The registry is the sole strong owner; the SQLite function hook holds a
/// weak reference.
pub(crate) struct CreatedFunctionState {
    name: String,
    definition: Option<FunctionDefinition>,
    /// Pool of prepared body statements. Recursive calls pop concurrently.
    statements: Vec<PreparedStatement>,
    memoized: bool,
    memo: HashMap<i64, SqlValue>,
}

impl CreatedFunctionState {
    fn reserved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            definition: None,
            statements: Vec::new(),
            memoized: false,
            memo: HashMap::new(),
        }
    }
}

type StateRef = Rc<RefCell<CreatedFunctionState>>;

pub struct FunctionRegistry {
    sqlite: Rc<SqliteEngine>,
    states: RefCell<HashMap<(String, usize), StateRef>>,
}

impl FunctionRegistry {
    pub(crate) fn new(sqlite: Rc<SqliteEngine>) -> Self {
        Self {
            sqlite,
            states: RefCell::new(HashMap::new()),
        }
    }

    /// Phase one: make `name` callable with `arity` arguments. Idempotent;
    /// an existing registration is returned untouched.
    pub(crate) fn reserve(&self, name: &str, arity: usize) -> Result<StateRef> {
        let key = (name.to_lowercase(), arity);
        if let Some(state) = self.states.borrow().get(&key) {
            return Ok(Rc::clone(state));
        }

        let state = Rc::new(RefCell::new(CreatedFunctionState::reserved(name)));
        let weak_state = Rc::downgrade(&state);
        let weak_engine = Rc::downgrade(&self.sqlite);
        create_scalar_function(
            &self.sqlite,
            name,
            arity,
            Box::new(move |args| invoke(&weak_state, &weak_engine, args)),
        )?;
        self.states.borrow_mut().insert(key, Rc::clone(&state));
        Ok(state)
    }

    /// Phase two: attach the validated body, or replace the previous one.
    pub(crate) fn finalize(
        &self,
        state: &StateRef,
        replace: bool,
        prototype: Prototype,
        return_type: ScalarType,
        body: SqlSource,
        statement: PreparedStatement,
        binding_order: Vec<usize>,
    ) -> Result<()> {
        let mut state = state.borrow_mut();
        if state.definition.is_some() && !replace {
            return Err(Error::AlreadyExists(format!(
                "{}: function already exists",
                state.name
            )));
        }
        state.definition = Some(FunctionDefinition {
            prototype,
            return_type,
            body,
            binding_order,
        });
        state.statements = vec![statement];
        state.memoized = false;
        state.memo.clear();
        Ok(())
    }

    /// Turn on the call-result cache for `name`. Only functions of exactly
    /// one integer argument returning an integer qualify.
    pub(crate) fn enable_memoization(&self, name: &str) -> Result<()> {
        let key = (name.to_lowercase(), 1);
        let states = self.states.borrow();
        let state = states.get(&key).ok_or_else(|| {
            Error::NotFound(format!(
                "{name}: no function of a single argument is registered"
            ))
        })?;
        let mut state = state.borrow_mut();
        let def = state.definition.as_ref().ok_or_else(|| {
            Error::NotFound(format!("{name}: no function of a single argument is registered"))
        })?;
        if !def.prototype.args[0].ty.is_integer() || !def.return_type.is_integer() {
            return Err(Error::Type(format!(
                "{name}: memoization requires an integer argument and an integer return type"
            )));
        }
        state.memoized = true;
        Ok(())
    }
}

/// Run one invocation. `Ok(None)` means the body produced no row, reported
/// to SQLite as the pointer sentinel rather than NULL.
fn invoke(
    state: &Weak<RefCell<CreatedFunctionState>>,
    engine: &Weak<SqliteEngine>,
    args: &[SqlValue],
) -> Result<Option<SqlValue>> {
    let state = state
        .upgrade()
        .ok_or_else(|| Error::Engine("function invoked after engine shutdown".into()))?;
    let engine = engine
        .upgrade()
        .ok_or_else(|| Error::Engine("function invoked after engine shutdown".into()))?;

    let (name, body, binding_order, memo_key) = {
        let st = state.borrow();
        let def = st.definition.as_ref().ok_or_else(|| {
            Error::NotFound(format!("{}: function was not defined", st.name))
        })?;
        let memo_key = match (st.memoized, args) {
            (true, [SqlValue::Integer(k)]) => Some(*k),
            _ => None,
        };
        if let Some(k) = memo_key {
            if let Some(cached) = st.memo.get(&k) {
                return Ok(Some(cached.clone()));
            }
        }
        (
            st.name.clone(),
            def.body.clone(),
            def.binding_order.clone(),
            memo_key,
        )
    };

    // Take a pooled statement; prepare a fresh one if a recursive caller
    // holds them all. The borrow is released before stepping so the body can
    // re-enter this function.
    let pooled = state.borrow_mut().statements.pop();
    let mut stmt = match pooled {
        Some(stmt) => stmt,
        None => engine.prepare(body.sql()).map_err(Error::from)?,
    };

    let result = run_body(&name, &mut stmt, &binding_order, args);
    let reset = stmt.reset();
    state.borrow_mut().statements.push(stmt);
    let result = result?;
    reset?;

    if let (Some(k), Some(v)) = (memo_key, result.as_ref()) {
        state.borrow_mut().memo.insert(k, v.clone());
    }
    Ok(result)
}

fn run_body(
    name: &str,
    stmt: &mut PreparedStatement,
    binding_order: &[usize],
    args: &[SqlValue],
) -> Result<Option<SqlValue>> {
    for (slot, &arg_idx) in binding_order.iter().enumerate() {
        stmt.bind_value(slot + 1, &args[arg_idx])?;
    }
    if !stmt.step()? {
        return Ok(None);
    }
    let value = stmt.column_value(0);
    if stmt.step()? {
        return Err(Error::Structural(format!(
            "{name}: the function body returned more than one row"
        )));
    }
    Ok(Some(value))
}

/// How SQLite calls back into Rust: a boxed closure as user data, one shared
/// trampoline, and a destructor that frees the box when the function is
/// unregistered or the connection closes.
pub(crate) type Callback = Box<dyn Fn(&[SqlValue]) -> Result<Option<SqlValue>>>;

struct FnHook {
    callback: Callback,
}

pub(crate) fn create_scalar_function(
    sqlite: &SqliteEngine,
    name: &str,
    arity: usize,
    callback: Callback,
) -> Result<()> {
    let c_name = CString::new(name)
        .map_err(|_| Error::Structural(format!("invalid function name '{name}'")))?;
    let hook = Box::new(FnHook { callback });
    let rc = unsafe {
        ffi::sqlite3_create_function_v2(
            sqlite.raw_handle(),
            c_name.as_ptr(),
            arity as c_int,
            ffi::SQLITE_UTF8,
            Box::into_raw(hook) as *mut c_void,
            Some(fn_trampoline),
            None,
            None,
            Some(fn_hook_destroy),
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(Error::Engine(format!(
            "failed to register function '{name}'"
        )));
    }
    Ok(())
}

unsafe extern "C" fn fn_trampoline(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let hook = &*(ffi::sqlite3_user_data(ctx) as *const FnHook);
    let args: Vec<SqlValue> = (0..argc as usize)
        .map(|i| ffi_util::value_from_raw(*argv.add(i)))
        .collect();
    match (hook.callback)(&args) {
        Ok(Some(value)) => ffi_util::set_result(ctx, &value),
        Ok(None) => ffi_util::set_result_void(ctx),
        Err(e) => ffi_util::set_result_error(ctx, &e.to_string()),
    }
}

unsafe extern "C" fn fn_hook_destroy(hook: *mut c_void) {
    drop(Box::from_raw(hook as *mut FnHook));
}
