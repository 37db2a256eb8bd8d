pub mod leaderboard;
pub mod reveal;
pub mod splash;
