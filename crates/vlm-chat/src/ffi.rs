//! C APIs for embedding the chat into a host app.
//!
//! The host creates a builder, registers its callbacks, builds a session
//! and then forwards user intents to it. Snapshots of the conversation
//! cross the boundary as JSON, see
//! [`Conversation`](vlm_chat_core::Conversation) for the layout.
//!
//! All functions can be called from any thread.

use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;
use std::sync::{Arc, LazyLock};

use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use vlm_chat_core::{ChatConfig, Conversation, ImageAttachment};
use vlm_chat_openai_model::{OpenAIConfigBuilder, OpenAIService};

use crate::{Session, SessionBuilder};

static TOKIO_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    RuntimeBuilder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("vlm-chat")
        .build()
        .expect("failed to create the Tokio runtime")
});

/// Status codes returned by the C APIs.
#[repr(u32)]
pub enum ErrorCode {
    /// The call succeeded.
    Ok = 0,
    /// A pointer, string or buffer argument was rejected.
    Invalid = 1,
}

/// Event handlers registered by the host.
///
/// The handlers may be invoked from any thread, so the host must make
/// them and `user_info` thread-safe.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SessionCallbacks {
    /// Opaque pointer handed back to every handler.
    pub user_info: *mut c_void,
    /// Invoked with a new snapshot of the conversation.
    ///
    /// Parameters:
    /// - `user_info`: The opaque pointer.
    /// - `json`: The snapshot as UTF-8 JSON, not nul-terminated and only
    ///   valid during the call.
    /// - `json_len`: Byte length of `json`.
    pub on_state_changed:
        Option<unsafe extern "C" fn(*mut c_void, *const c_char, usize)>,
    /// Invoked when a turn has ended and the session accepts a new
    /// message.
    pub on_idle: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Invoked once when no handler can be called anymore, to release
    /// `user_info`.
    pub free: Option<unsafe extern "C" fn(*mut c_void)>,
}

// SAFETY: The host guarantees the handlers and `user_info` are thread-safe.
unsafe impl Send for SessionCallbacks {}
unsafe impl Sync for SessionCallbacks {}

/// Shared by every handler closure, so `free` runs after the last one is
/// dropped.
struct CallbackContext(SessionCallbacks);

impl CallbackContext {
    fn state_changed(&self, conversation: &Conversation) {
        let Some(on_state_changed) = self.0.on_state_changed else {
            return;
        };
        match serde_json::to_string(conversation) {
            // SAFETY: The host registered a valid handler.
            Ok(json) => unsafe {
                let user_info = self.0.user_info;
                on_state_changed(user_info, json.as_ptr().cast(), json.len())
            },
            Err(err) => error!("failed to serialize the snapshot: {err}"),
        }
    }

    fn idle(&self) {
        if let Some(on_idle) = self.0.on_idle {
            // SAFETY: The host registered a valid handler.
            unsafe { on_idle(self.0.user_info) };
        }
    }
}

impl Drop for CallbackContext {
    fn drop(&mut self) {
        if let Some(free) = self.0.free {
            // SAFETY: The host registered a valid handler.
            unsafe { free(self.0.user_info) };
        }
    }
}

/// Heap slot for a builder. The builder methods take `self`, so it's moved
/// out and back in on every change.
struct BuilderSlot {
    builder: Option<SessionBuilder>,
    has_callbacks: bool,
}

/// # Safety
///
/// `s` must be a valid nul-terminated string.
unsafe fn utf8_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    // SAFETY: Checked for null, the rest is up to the caller.
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// # Safety
///
/// `session` must be a pointer returned from `vc_session_builder_build`.
unsafe fn session_ref<'a>(session: *mut c_void) -> &'a Session {
    // SAFETY: Up to the caller.
    unsafe { &*(session as *const Session) }
}

/// Creates a session builder that talks to an OpenAI-compatible server.
///
/// On success, `out` receives the builder. It must be consumed by either
/// `vc_session_builder_build` or `vc_session_builder_free`.
///
/// # Safety
///
/// The strings must be nul-terminated. `out` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_builder_new_openai(
    out: *mut *mut c_void,
    api_key: *const c_char,
    base_url: *const c_char,
    model: *const c_char,
) -> ErrorCode {
    // SAFETY: Up to the caller.
    let args = unsafe {
        (utf8_arg(api_key), utf8_arg(base_url), utf8_arg(model))
    };
    let (Some(api_key), Some(base_url), Some(model)) = args else {
        return ErrorCode::Invalid;
    };
    if out.is_null() {
        return ErrorCode::Invalid;
    }

    let config = OpenAIConfigBuilder::with_api_key(api_key)
        .with_base_url(base_url)
        .build();
    let builder = SessionBuilder::with_model_service(OpenAIService::new(config))
        .with_config(ChatConfig::builder().with_model_id(model).build());
    let slot = Box::into_raw(Box::new(BuilderSlot {
        builder: Some(builder),
        has_callbacks: false,
    }));
    // SAFETY: Checked for null, the rest is up to the caller.
    unsafe { out.write(slot.cast()) };

    ErrorCode::Ok
}

/// Registers the event handlers.
///
/// Handlers can be registered only once per builder. Later calls return
/// `Invalid` and leave `user_info` untouched, so its `free` is never
/// called for them.
///
/// # Safety
///
/// `builder` must come from `vc_session_builder_new_openai` and not be
/// consumed yet. `callbacks` must point to a valid `SessionCallbacks`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_builder_set_callbacks(
    builder: *mut c_void,
    callbacks: *const SessionCallbacks,
) -> ErrorCode {
    if builder.is_null() || callbacks.is_null() {
        return ErrorCode::Invalid;
    }
    // SAFETY: Up to the caller.
    let (slot, callbacks) =
        unsafe { (&mut *(builder as *mut BuilderSlot), *callbacks) };
    if slot.has_callbacks {
        warn!("the session callbacks have been registered already");
        return ErrorCode::Invalid;
    }
    let Some(mut session_builder) = slot.builder.take() else {
        error!("the session builder has been consumed");
        return ErrorCode::Invalid;
    };

    let context = Arc::new(CallbackContext(callbacks));
    if callbacks.on_idle.is_some() {
        let context = Arc::clone(&context);
        session_builder = session_builder.on_idle(move || context.idle());
    }
    if callbacks.on_state_changed.is_some() {
        let context = Arc::clone(&context);
        session_builder = session_builder.on_change(move |conversation| {
            context.state_changed(conversation);
        });
    }
    slot.builder = Some(session_builder);
    slot.has_callbacks = true;
    ErrorCode::Ok
}

/// Releases a builder that won't be built.
///
/// # Safety
///
/// `builder` must come from `vc_session_builder_new_openai` and not be
/// consumed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_builder_free(builder: *mut c_void) {
    // SAFETY: Up to the caller.
    drop(unsafe { Box::from_raw(builder as *mut BuilderSlot) });
}

/// Consumes the builder, creates the session and starts loading the
/// model.
///
/// Returns null if the builder was emptied by an earlier failure.
///
/// # Safety
///
/// `builder` must come from `vc_session_builder_new_openai` and not be
/// consumed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_builder_build(
    builder: *mut c_void,
) -> *mut c_void {
    // SAFETY: Up to the caller.
    let slot = unsafe { Box::from_raw(builder as *mut BuilderSlot) };
    let Some(session_builder) = slot.builder else {
        return ptr::null_mut();
    };

    // The orchestrator actor is spawned on build.
    let _enter = TOKIO_RUNTIME.enter();
    Box::into_raw(Box::new(session_builder.build())).cast()
}

/// Destroys the session, cancelling the turn in flight.
///
/// # Safety
///
/// `session` must come from `vc_session_builder_build` and must not be
/// used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_free(session: *mut c_void) {
    // SAFETY: Up to the caller.
    let session = unsafe { Box::from_raw(session as *mut Session) };
    let _enter = TOKIO_RUNTIME.enter();
    session.orchestrator().shutdown();
    drop(session);
}

/// Sends a message. It's ignored if it's blank or a turn is in flight.
///
/// # Safety
///
/// `session` must come from `vc_session_builder_build`. `message` must be
/// nul-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_send_message(
    session: *mut c_void,
    message: *const c_char,
) -> ErrorCode {
    // SAFETY: Up to the caller.
    let (session, message) =
        unsafe { (session_ref(session), utf8_arg(message)) };
    let Some(message) = message else {
        return ErrorCode::Invalid;
    };
    session.send_message(message);
    ErrorCode::Ok
}

/// Cancels the turn in flight, if any.
///
/// # Safety
///
/// `session` must come from `vc_session_builder_build`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_cancel(session: *mut c_void) {
    // SAFETY: Up to the caller.
    unsafe { session_ref(session) }.cancel();
}

/// Attaches an encoded image (PNG, JPEG) to the next message.
///
/// The bytes are copied and only decoded when the message is sent.
///
/// # Safety
///
/// `session` must come from `vc_session_builder_build`. `data` must be
/// valid for reads of `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_attach_image(
    session: *mut c_void,
    data: *const u8,
    len: usize,
) -> ErrorCode {
    if data.is_null() || len == 0 {
        return ErrorCode::Invalid;
    }
    // SAFETY: Up to the caller.
    let (session, data) = unsafe {
        (session_ref(session), std::slice::from_raw_parts(data, len))
    };
    session.attach_image(ImageAttachment::new(data.to_vec()));
    ErrorCode::Ok
}

/// Removes the pending image.
///
/// # Safety
///
/// `session` must come from `vc_session_builder_build`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_remove_image(session: *mut c_void) {
    // SAFETY: Up to the caller.
    unsafe { session_ref(session) }.remove_image();
}

/// Returns the latest snapshot as a nul-terminated JSON string, or null
/// on failure.
///
/// Release the string with `vc_string_free`.
///
/// # Safety
///
/// `session` must come from `vc_session_builder_build`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_session_copy_snapshot(
    session: *mut c_void,
) -> *mut c_char {
    // SAFETY: Up to the caller.
    let session = unsafe { session_ref(session) };
    let json = match session.current_json() {
        Ok(json) => json,
        Err(err) => {
            error!("failed to serialize the snapshot: {err}");
            return ptr::null_mut();
        }
    };
    // JSON strings never contain a raw nul.
    CString::new(json).map_or(ptr::null_mut(), CString::into_raw)
}

/// Releases a string returned by `vc_session_copy_snapshot`.
///
/// # Safety
///
/// `s` must come from `vc_session_copy_snapshot` or be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vc_string_free(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: Up to the caller.
        drop(unsafe { CString::from_raw(s) });
    }
}
