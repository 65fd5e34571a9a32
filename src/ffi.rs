//! C-compatible Foreign Function Interface (FFI) for butterfly-map
//!
//! Lets a host written in C, C++, or anything that can call C (a webview shell,
//! a mobile bridge) drive the merchant map. The host supplies the mapping
//! engine as a table of callbacks through `butterfly_map_register_engine()`,
//! then calls the process-wide functions below.
//!
//! # Memory Management
//!
//! - All string parameters are null-terminated UTF-8 C strings (char*)
//! - Strings passed to engine callbacks are only valid for the duration of the call
//! - Returned strings are allocated by Rust and must be freed with `butterfly_map_free_string()`
//!
//! # Error Handling
//!
//! All functions return a ButterflyMapResult code:
//! - 0: Success
//! - 1: Invalid parameter
//! - 2: Container not found
//! - 3: Map not initialized
//! - 4: Malformed input
//! - 5: Engine error
//! - 6: Unknown error
//! - 7: Busy (called from inside an engine callback, see below)
//!
//! Every failure is also logged and its message kept for `butterfly_map_last_error_message()`.
//!
//! # Deferred work
//!
//! The host must call `butterfly_map_run_due()` regularly (e.g. every animation
//! frame) so post-load resizes and popup dismissals happen on time.
//!
//! # Threading Model
//!
//! One controller serves the whole process behind a mutex; calls from several
//! threads are serialized. Engine callbacks run while that mutex is held, so
//! from inside a callback:
//!
//! - `butterfly_map_notify_*` functions are queued and applied once the outer
//!   call has finished its own work, in arrival order. They return `Success`.
//! - Every other `butterfly_map_*` function returns `Busy` without doing anything.

use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Mutex;

use log::{debug, error};
use once_cell::sync::Lazy;
use tokio::time::Instant;

use crate::core::config::{ControlPosition, MapConfig, PopupOptions};
use crate::core::controller::MapViewController;
use crate::core::engine::{Control, MapEngine, MapEvent, MapHandle, MapOptions, MarkerHandle, MarkerIcon};
use crate::core::error::{Error, Result};
use crate::core::geo::LatLng;
use crate::core::merchant::PopupContent;

/// Callbacks implementing the mapping engine on the host side
///
/// Handles are host-chosen non-zero integers; `0` signals failure. Options,
/// controls and popup content are passed as JSON objects.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ButterflyMapEngine {
    pub user_data: *mut c_void,
    pub prepare_container: extern "C" fn(*mut c_void, *const c_char) -> bool,
    pub create_map: extern "C" fn(*mut c_void, options_json: *const c_char) -> u64,
    pub add_control: extern "C" fn(*mut c_void, map: u64, control_json: *const c_char) -> bool,
    pub resize: extern "C" fn(*mut c_void, map: u64) -> bool,
    pub remove_map: extern "C" fn(*mut c_void, map: u64),
    pub register_window_resize_listener: extern "C" fn(*mut c_void),
    pub add_marker: extern "C" fn(*mut c_void, map: u64, lat: f64, lng: f64, icon_json: *const c_char) -> u64,
    pub set_popup: extern "C" fn(*mut c_void, marker: u64, popup_json: *const c_char) -> bool,
    pub show_popup: extern "C" fn(*mut c_void, map: u64, marker: u64),
    pub hide_popup: extern "C" fn(*mut c_void, marker: u64),
    pub is_popup_hovered: extern "C" fn(*mut c_void, marker: u64) -> bool,
    pub remove_marker: extern "C" fn(*mut c_void, marker: u64),
}

/// Engine backed by host callbacks
struct ForeignEngine(ButterflyMapEngine);

// SAFETY: the controller is only reached through the global mutex and the
// host promises its callbacks may be invoked from whichever thread calls in.
unsafe impl Send for ForeignEngine {}

fn to_json_cstring<T: serde::Serialize>(value: &T) -> Result<CString> {
    let json = serde_json::to_string(value).map_err(|e| Error::MapEngine(e.to_string()))?;
    CString::new(json).map_err(|e| Error::MapEngine(e.to_string()))
}

fn engine_call(ok: bool, what: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::MapEngine(format!("{what} failed")))
    }
}

impl MapEngine for ForeignEngine {
    fn prepare_container(&mut self, container_id: &str) -> bool {
        match CString::new(container_id) {
            Ok(id) => (self.0.prepare_container)(self.0.user_data, id.as_ptr()),
            Err(_) => false,
        }
    }

    fn create_map(&mut self, options: &MapOptions) -> Result<MapHandle> {
        let json = to_json_cstring(options)?;
        match (self.0.create_map)(self.0.user_data, json.as_ptr()) {
            0 => Err(Error::MapEngine("map construction failed".to_string())),
            id => Ok(MapHandle(id)),
        }
    }

    fn add_control(&mut self, map: MapHandle, control: &Control, position: ControlPosition) -> Result<()> {
        let json = to_json_cstring(&serde_json::json!({
            "control": control,
            "position": position,
        }))?;
        engine_call((self.0.add_control)(self.0.user_data, map.0, json.as_ptr()), "add_control")
    }

    fn resize(&mut self, map: MapHandle) -> Result<()> {
        engine_call((self.0.resize)(self.0.user_data, map.0), "resize")
    }

    fn remove_map(&mut self, map: MapHandle) {
        (self.0.remove_map)(self.0.user_data, map.0)
    }

    fn register_window_resize_listener(&mut self) {
        (self.0.register_window_resize_listener)(self.0.user_data)
    }

    fn add_marker(&mut self, map: MapHandle, position: LatLng, icon: &MarkerIcon) -> Result<MarkerHandle> {
        let json = to_json_cstring(icon)?;
        match (self.0.add_marker)(self.0.user_data, map.0, position.lat, position.lng, json.as_ptr()) {
            0 => Err(Error::MapEngine("marker construction failed".to_string())),
            id => Ok(MarkerHandle(id)),
        }
    }

    fn set_popup(&mut self, marker: MarkerHandle, content: &PopupContent, options: &PopupOptions) -> Result<()> {
        let json = to_json_cstring(&serde_json::json!({
            "content": content,
            "options": options,
        }))?;
        engine_call((self.0.set_popup)(self.0.user_data, marker.0, json.as_ptr()), "set_popup")
    }

    fn show_popup(&mut self, map: MapHandle, marker: MarkerHandle) {
        (self.0.show_popup)(self.0.user_data, map.0, marker.0)
    }

    fn hide_popup(&mut self, marker: MarkerHandle) {
        (self.0.hide_popup)(self.0.user_data, marker.0)
    }

    fn is_popup_hovered(&self, marker: MarkerHandle) -> bool {
        (self.0.is_popup_hovered)(self.0.user_data, marker.0)
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        (self.0.remove_marker)(self.0.user_data, marker.0)
    }
}

/// The single process-wide controller
static CONTROLLER: Lazy<Mutex<Option<MapViewController<ForeignEngine>>>> = Lazy::new(|| Mutex::new(None));

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };

    /// Set while this thread holds the controller
    static IN_CALL: Cell<bool> = const { Cell::new(false) };

    /// Notifications received from engine callbacks during the current call
    static QUEUED_EVENTS: RefCell<Vec<MapEvent>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as inside a call; cleared on drop, panics included
struct CallGuard;

impl CallGuard {
    fn enter() -> Option<Self> {
        if IN_CALL.with(|c| c.replace(true)) {
            None
        } else {
            Some(CallGuard)
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        IN_CALL.with(|c| c.set(false));
        QUEUED_EVENTS.with(|q| q.borrow_mut().clear());
    }
}

fn busy(operation: &str) -> ButterflyMapResult {
    set_last_error(format!("{operation} called from inside an engine callback"));
    ButterflyMapResult::Busy
}

fn take_queued_event() -> Option<MapEvent> {
    QUEUED_EVENTS.with(|q| {
        let mut queue = q.borrow_mut();
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    })
}

/// Store an error message in thread-local storage for later retrieval.
fn set_last_error(msg: String) {
    error!("{msg}");
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Result codes for C FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButterflyMapResult {
    Success = 0,
    InvalidParameter = 1,
    ContainerNotFound = 2,
    MapNotInitialized = 3,
    MalformedInput = 4,
    EngineError = 5,
    UnknownError = 6,
    Busy = 7,
}

fn convert_error(operation: &str, result: Result<()>) -> ButterflyMapResult {
    match result {
        Ok(()) => {
            clear_last_error();
            ButterflyMapResult::Success
        }
        Err(e) => {
            set_last_error(format!("Error in {operation}: {e}"));
            match e {
                Error::InvalidInput(_) => ButterflyMapResult::InvalidParameter,
                Error::ContainerNotFound { .. } => ButterflyMapResult::ContainerNotFound,
                Error::MapNotInitialized => ButterflyMapResult::MapNotInitialized,
                Error::MalformedInput(_) => ButterflyMapResult::MalformedInput,
                Error::MapEngine(_) => ButterflyMapResult::EngineError,
                Error::DriverStopped | Error::IoError(_) => ButterflyMapResult::UnknownError,
            }
        }
    }
}

/// Run `f` against the registered controller, guarding against panics
///
/// Notifications queued by engine callbacks while `f` runs are applied before
/// the controller is released; their failures are logged only.
fn with_controller<F>(operation: &str, f: F) -> ButterflyMapResult
where
    F: FnOnce(&mut MapViewController<ForeignEngine>) -> Result<()>,
{
    let Some(_call) = CallGuard::enter() else {
        return busy(operation);
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut guard = match CONTROLLER.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(controller) = guard.as_mut() else {
            return Err(Error::MapEngine("no engine registered".to_string()));
        };

        let result = f(controller);
        while let Some(event) = take_queued_event() {
            debug!("Applying queued {event:?}");
            if let Err(e) = controller.handle_event(event) {
                error!("Error in queued notification: {e}");
            }
        }
        result
    }));

    match outcome {
        Ok(result) => convert_error(operation, result),
        Err(_) => {
            set_last_error(format!("internal panic caught in {operation}"));
            ButterflyMapResult::UnknownError
        }
    }
}

/// Read a C string parameter
///
/// # Safety
///
/// `ptr` must be NULL or a valid null-terminated string.
unsafe fn read_str<'a>(ptr: *const c_char, name: &str) -> std::result::Result<&'a str, ButterflyMapResult> {
    if ptr.is_null() {
        set_last_error(format!("{name} parameter is NULL"));
        return Err(ButterflyMapResult::InvalidParameter);
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| {
        set_last_error(format!("{name} parameter is not valid UTF-8"));
        ButterflyMapResult::InvalidParameter
    })
}

/// Register the host's mapping engine
///
/// Replaces any previously registered engine, tearing down its map first.
/// Configuration is read from the `BUTTERFLY_MAP_*` environment variables.
#[no_mangle]
pub extern "C" fn butterfly_map_register_engine(engine: ButterflyMapEngine) -> ButterflyMapResult {
    let Some(_call) = CallGuard::enter() else {
        return busy("butterfly_map_register_engine");
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut guard = match CONTROLLER.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Dropping the old controller tears its map down
        *guard = Some(MapViewController::with_config(
            ForeignEngine(engine),
            MapConfig::from_env(),
        ));
    }));

    match outcome {
        Ok(()) => ButterflyMapResult::Success,
        Err(_) => {
            set_last_error("internal panic caught in butterfly_map_register_engine".to_string());
            ButterflyMapResult::UnknownError
        }
    }
}

/// Create the map view in `container_id`, replacing any existing one
///
/// # Safety
///
/// `container_id` must be a valid, null-terminated C string or NULL (returns InvalidParameter).
#[no_mangle]
pub unsafe extern "C" fn butterfly_map_initialize(
    container_id: *const c_char,
    lat: f64,
    lon: f64,
    zoom: f64,
) -> ButterflyMapResult {
    let container_id = match read_str(container_id, "container_id") {
        Ok(s) => s,
        Err(code) => return code,
    };
    with_controller("butterfly_map_initialize", |c| {
        c.initialize(container_id, lat, lon, zoom).map(|_| ())
    })
}

/// Handle of the live map, or 0 when there is none
#[no_mangle]
pub extern "C" fn butterfly_map_handle() -> u64 {
    let mut handle = 0;
    with_controller("butterfly_map_handle", |c| {
        handle = c.handle().map_or(0, |h| h.0);
        Ok(())
    });
    handle
}

#[no_mangle]
pub extern "C" fn butterfly_map_resize() -> ButterflyMapResult {
    with_controller("butterfly_map_resize", |c| c.resize())
}

#[no_mangle]
pub extern "C" fn butterfly_map_cleanup() -> ButterflyMapResult {
    with_controller("butterfly_map_cleanup", |c| {
        c.teardown();
        Ok(())
    })
}

/// Replace all markers with the merchants in `merchants_json`
///
/// # Safety
///
/// `merchants_json` must be a valid, null-terminated C string or NULL (returns InvalidParameter).
#[no_mangle]
pub unsafe extern "C" fn butterfly_map_add_merchants(merchants_json: *const c_char) -> ButterflyMapResult {
    let json = match read_str(merchants_json, "merchants_json") {
        Ok(s) => s,
        Err(code) => return code,
    };
    with_controller("butterfly_map_add_merchants", |c| c.add_merchants(json))
}

#[no_mangle]
pub extern "C" fn butterfly_map_clear_merchant_markers() -> ButterflyMapResult {
    with_controller("butterfly_map_clear_merchant_markers", |c| {
        c.clear_merchant_markers();
        Ok(())
    })
}

/// Number of markers currently on the map
#[no_mangle]
pub extern "C" fn butterfly_map_marker_count() -> usize {
    let mut count = 0;
    with_controller("butterfly_map_marker_count", |c| {
        count = c.markers().len();
        Ok(())
    });
    count
}

/// Deliver a notification now, or queue it when called from an engine callback
fn notify(operation: &str, event: MapEvent) -> ButterflyMapResult {
    if IN_CALL.with(Cell::get) {
        QUEUED_EVENTS.with(|q| q.borrow_mut().push(event));
        return ButterflyMapResult::Success;
    }
    with_controller(operation, |c| c.handle_event(event))
}

/// The engine finished loading `map`
#[no_mangle]
pub extern "C" fn butterfly_map_notify_loaded(map: u64) -> ButterflyMapResult {
    notify("butterfly_map_notify_loaded", MapEvent::Loaded(MapHandle(map)))
}

/// The engine reported a runtime error for `map`
///
/// # Safety
///
/// `message` must be a valid, null-terminated C string or NULL.
#[no_mangle]
pub unsafe extern "C" fn butterfly_map_notify_error(map: u64, message: *const c_char) -> ButterflyMapResult {
    let message = if message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    };
    notify(
        "butterfly_map_notify_error",
        MapEvent::EngineError {
            map: MapHandle(map),
            message,
        },
    )
}

#[no_mangle]
pub extern "C" fn butterfly_map_notify_window_resized() -> ButterflyMapResult {
    notify("butterfly_map_notify_window_resized", MapEvent::WindowResized)
}

#[no_mangle]
pub extern "C" fn butterfly_map_notify_pointer_enter(marker: u64) -> ButterflyMapResult {
    notify(
        "butterfly_map_notify_pointer_enter",
        MapEvent::MarkerPointerEnter(MarkerHandle(marker)),
    )
}

#[no_mangle]
pub extern "C" fn butterfly_map_notify_pointer_leave(marker: u64) -> ButterflyMapResult {
    notify(
        "butterfly_map_notify_pointer_leave",
        MapEvent::MarkerPointerLeave(MarkerHandle(marker)),
    )
}

/// Run deferred resizes and popup dismissals that are due
///
/// Hosts must pump this from their event loop. Pending entries are bounded (one
/// resize plus one dismissal per marker), but nothing fires until this is called.
#[no_mangle]
pub extern "C" fn butterfly_map_run_due() -> ButterflyMapResult {
    with_controller("butterfly_map_run_due", |c| {
        c.run_due(Instant::now());
        Ok(())
    })
}

/// Get the last error message from the most recent FFI call on this thread.
///
/// Returns a string that must be freed with `butterfly_map_free_string()`,
/// or NULL if the last call succeeded.
#[no_mangle]
pub extern "C" fn butterfly_map_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| match e.borrow().as_deref() {
        Some(msg) => CString::new(msg).map_or(ptr::null_mut(), CString::into_raw),
        None => ptr::null_mut(),
    })
}

/// Free a string allocated by the library
///
/// # Safety
///
/// `ptr` must be NULL or a pointer returned by this library that was not freed yet.
#[no_mangle]
pub unsafe extern "C" fn butterfly_map_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get library version string
///
/// # Returns
/// Static string with version information (does not need to be freed)
#[no_mangle]
pub extern "C" fn butterfly_map_version() -> *const c_char {
    static VERSION_STRING: Lazy<CString> = Lazy::new(|| {
        CString::new(format!("butterfly-map {}", env!("BUTTERFLY_VERSION"))).unwrap_or_default()
    });
    VERSION_STRING.as_ptr()
}
