mod court;
mod feedback;
mod reservation;
mod weather;

pub use self::court::*;
pub use self::feedback::*;
pub use self::reservation::*;
pub use self::weather::*;

/// バックエンドの API パス
pub(crate) const API_PREFIX: &str = "/api/v1";
