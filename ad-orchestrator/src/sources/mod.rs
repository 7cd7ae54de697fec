pub mod google_trends;
pub mod reddit;
pub mod seasonal;
pub mod social;

pub use google_trends::GoogleTrendsSource;
pub use reddit::RedditSource;
pub use seasonal::SeasonalSource;
pub use social::SocialTrendsSource;
