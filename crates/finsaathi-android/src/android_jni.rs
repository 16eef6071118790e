use jni::{
    JNIEnv,
    objects::{JClass, JString},
    sys::{JNI_FALSE, JNI_TRUE, jboolean, jlong, jstring},
};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use finsaathi_host::config::HostConfig;

use crate::bridge::NativeBridge;

// Static initialization for logging
static INIT: Once = Once::new();

// The configured bridge; None before nativeConfigureEngine and after nativeDestroy
static BRIDGE: Mutex<Option<Arc<NativeBridge>>> = Mutex::new(None);

fn bridge_slot() -> MutexGuard<'static, Option<Arc<NativeBridge>>> {
    BRIDGE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current_bridge() -> Option<Arc<NativeBridge>> {
    bridge_slot().clone()
}

/// Initialize logging and panic hook for Android
fn init_logging() {
    INIT.call_once(|| {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Info)
                .with_tag("finsaathi"),
        );

        std::panic::set_hook(Box::new(|info| {
            let payload = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "Unknown panic".to_string());

            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown".to_string());

            log::error!("PANIC at {}: {}", location, payload);
        }));
    });
}

/// Read an optional Java string; `null` maps to `None`.
fn read_optional_string(env: &mut JNIEnv, value: &JString) -> Result<Option<String>, jni::errors::Error> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(env.get_string(value)?.into()))
}

/// Configure the native side of the Flutter engine
///
/// Called from MainActivity.configureFlutterEngine(), before any channel call.
/// Calling it again while configured is a no-op.
///
/// # Arguments
/// * `config_json` - Host configuration as JSON, or null for defaults
///
/// # Returns
/// JNI_TRUE when the bridge is ready
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_finsaathi_1multi_MainActivity_nativeConfigureEngine(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jboolean {
    init_logging();
    log::info!("nativeConfigureEngine called");

    let mut slot = bridge_slot();
    if slot.is_some() {
        log::info!("Bridge already configured");
        return JNI_TRUE;
    }

    let config = match read_optional_string(&mut env, &config_json) {
        Ok(Some(json)) if !json.trim().is_empty() => match serde_json::from_str::<HostConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Invalid host config: {:?}", e);
                return JNI_FALSE;
            }
        },
        Ok(_) => HostConfig::default(),
        Err(e) => {
            log::error!("Failed to read host config string: {:?}", e);
            return JNI_FALSE;
        }
    };

    match NativeBridge::start(config) {
        Ok(bridge) => {
            *slot = Some(Arc::new(bridge));
            log::info!("nativeConfigureEngine completed successfully");
            JNI_TRUE
        }
        Err(e) => {
            log::error!("Failed to start native bridge: {:?}", e);
            JNI_FALSE
        }
    }
}

/// Submit a method channel call
///
/// The reply is delivered through nativeDrainReplies() under the same call id.
///
/// # Arguments
/// * `channel` - Channel name
/// * `call_id` - Id chosen by the caller to match the reply
/// * `method` - Method name
/// * `args_json` - Arguments as JSON, or null
///
/// # Returns
/// JNI_FALSE if the call could not be submitted (no reply will follow)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_finsaathi_1multi_MainActivity_nativeInvoke(
    mut env: JNIEnv,
    _class: JClass,
    channel: JString,
    call_id: jlong,
    method: JString,
    args_json: JString,
) -> jboolean {
    let Some(bridge) = current_bridge() else {
        log::error!("nativeInvoke called before nativeConfigureEngine");
        return JNI_FALSE;
    };

    let channel: String = match env.get_string(&channel) {
        Ok(s) => s.into(),
        Err(e) => {
            log::error!("Failed to get channel string: {:?}", e);
            return JNI_FALSE;
        }
    };
    let method: String = match env.get_string(&method) {
        Ok(s) => s.into(),
        Err(e) => {
            log::error!("Failed to get method string: {:?}", e);
            return JNI_FALSE;
        }
    };
    let args = match read_optional_string(&mut env, &args_json) {
        Ok(args) => args,
        Err(e) => {
            log::error!("Failed to get args string: {:?}", e);
            return JNI_FALSE;
        }
    };

    log::debug!("nativeInvoke: {} {} (id {})", channel, method, call_id);
    bridge.submit(channel, call_id, method, args);
    JNI_TRUE
}

/// Drain finished replies
///
/// Called from the main thread (e.g., posted to the main looper after each
/// nativeInvoke). Returns a JSON array of {"id", "envelope"}, or null on failure.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_finsaathi_1multi_MainActivity_nativeDrainReplies(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let json = match current_bridge() {
        Some(bridge) => match bridge.drain_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to encode replies: {:?}", e);
                return std::ptr::null_mut();
            }
        },
        None => "[]".to_string(),
    };

    match env.new_string(json) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            log::error!("Failed to create reply string: {:?}", e);
            std::ptr::null_mut()
        }
    }
}

/// Tear down the bridge
///
/// Called from MainActivity.onDestroy()
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_example_finsaathi_1multi_MainActivity_nativeDestroy(
    _env: JNIEnv,
    _class: JClass,
) {
    log::info!("nativeDestroy called");

    let Some(bridge) = bridge_slot().take() else {
        log::warn!("nativeDestroy called without a configured bridge");
        return;
    };

    // A concurrent JNI call may still hold a clone; it drops the runtime when done
    match Arc::try_unwrap(bridge) {
        Ok(bridge) => bridge.shutdown(),
        Err(_) => log::warn!("Bridge still in use; runtime dropped with last reference"),
    }

    log::info!("nativeDestroy completed");
}
