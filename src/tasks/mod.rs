pub mod poll_ender;
pub mod tally_listener;
