// FinSaathi Android native library
//
// Loaded by MainActivity. Hosts the native side of the method channels and
// hands replies back to the activity's main thread.

// Reply queue for worker → main thread hand-off
pub mod reply_queue;

// JNI-independent bridge state
pub mod bridge;

// JNI exports for MainActivity
#[cfg(target_os = "android")]
pub mod android_jni;
