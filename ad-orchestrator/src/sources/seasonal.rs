use crate::clock::Clock;
use crate::traits::TrendSource;
use crate::types::Result;
use async_trait::async_trait;
use chrono::Datelike;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::info;

const EVERGREEN: &[&str] = &[
    "Healthy lifestyle tips",
    "Creative art projects",
    "Home improvement ideas",
    "Pet care tips",
    "Cooking techniques",
    "Travel destinations",
    "Fitness routines",
    "Photography tips",
    "Music discoveries",
    "Book recommendations",
];

const SAMPLE_SIZE: usize = 10;

fn monthly_topics(month: u32) -> &'static [&'static str] {
    match month {
        1 => &["New Year resolutions", "Winter sports", "Cozy home decor", "Fitness goals", "Detox recipes"],
        2 => &["Valentine's Day gifts", "Winter fashion", "Indoor activities", "Heart-healthy recipes", "Love quotes"],
        3 => &["Spring cleaning", "Garden planning", "Easter decorations", "Spring fashion", "Outdoor activities"],
        4 => &["Earth Day activities", "Spring flowers", "Outdoor fitness", "Fresh recipes", "Travel planning"],
        5 => &["Mother's Day gifts", "Graduation parties", "Summer planning", "Outdoor weddings", "BBQ recipes"],
        6 => &["Father's Day gifts", "Summer vacations", "Beach activities", "Outdoor sports", "Pool parties"],
        8 => &["Back to school", "Summer activities", "Vacation photos", "School supplies", "Family time"],
        9 => &["Fall fashion", "Autumn decorations", "School activities", "Harvest festivals", "Comfort food"],
        10 => &["Halloween costumes", "Autumn leaves", "Pumpkin recipes", "Fall activities", "Cozy sweaters"],
        11 => &["Thanksgiving recipes", "Holiday planning", "Black Friday deals", "Gratitude activities", "Family gatherings"],
        12 => &["Christmas gifts", "Holiday decorations", "Winter activities", "Holiday recipes", "Year-end reflection"],
        _ => &["Summer festivals", "Independence Day", "Beach fashion", "Outdoor concerts", "Summer recipes"],
    }
}

/// Curated topics for the current month. Never touches the network.
pub struct SeasonalSource {
    clock: Arc<dyn Clock>,
}

impl SeasonalSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn sample(&self) -> Vec<String> {
        let month = self.clock.now().month();
        let mut topics: Vec<&str> = monthly_topics(month).iter().chain(EVERGREEN).copied().collect();
        topics.shuffle(&mut rand::thread_rng());
        topics.truncate(SAMPLE_SIZE);

        info!("Picked {} seasonal topics for month {}", topics.len(), month);
        topics.into_iter().map(String::from).collect()
    }
}

#[async_trait]
impl TrendSource for SeasonalSource {
    fn source_name(&self) -> &str {
        "seasonal"
    }

    fn is_external(&self) -> bool {
        false
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.sample())
    }
}
