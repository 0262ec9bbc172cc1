// src/services/mod.rs
pub mod backend;
pub mod firebase_backend;
pub mod geofence_service;
pub mod local_platform;
pub mod messaging_service;
pub mod order_service;
pub mod subscription;

pub use backend::{ConfigSource, MemoryBackend, OrderSource};
pub use firebase_backend::{FirebaseBackend, FirebaseConfig};
pub use geofence_service::GeofenceStore;
pub use local_platform::{NotificationTray, WindowRegistry};
pub use messaging_service::{BackgroundWorker, ForegroundNotifier, NotificationPlatform, WindowClients};
pub use order_service::{LiveFeed, OrderChannel, OrderTracker};
pub use subscription::{EventSink, SourceEvent, Subscription};
