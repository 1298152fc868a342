pub mod blocked_site;
pub mod focus_session;
mod lenient;
pub mod native_app;
pub mod settings;
pub mod stats;
pub mod task;

pub use blocked_site::{BlockMode, BlockedSite};
pub use focus_session::{ActiveSession, FocusSession};
pub use lenient::parse_collection;
pub use native_app::NativeAppMode;
pub use settings::Settings;
pub use stats::{percentage_change, DailyAppUsage, DailyStat, TotalStats};
pub use task::{Priority, Task};
