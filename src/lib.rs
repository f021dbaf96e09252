pub mod analysis;
pub mod backup;
pub mod collections;
pub mod config;
pub mod database;
pub mod error;
pub mod schema;
pub mod state;

pub use error::Error;
pub use error::Result;

/// dimensional analysis types
pub type PlayerId = u8;
pub type FaceValue = u8;
pub type DiceCount = u8;
pub type Points = u8;

// dice parameters
pub const MAX_DICE: usize = 5;
pub const DIE_FACES: u8 = 6;
pub const DIE_BITS: u32 = 3;

// history and analytics parameters
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_SERIES_CAPACITY: usize = 1000;
pub const DEFAULT_ROLLING_WINDOW: usize = 100;

/// chi-square critical value at alpha = 0.05 with 5 degrees of freedom
pub const CHI_SQUARE_CRITICAL_5DF: f64 = 11.070;

// statement cache parameters
pub const STATEMENT_CACHE_CAPACITY: usize = 64;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// initialize logging
pub fn init() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}
