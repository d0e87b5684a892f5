//! The build banner: one line of aggregate status for the open flow.
//!
//! [`render`] derives a [`BannerView`] from the flow state. The
//! [`BannerController`] calls it on a fast tick so the elapsed counter moves,
//! publishes the result on a watch channel, hides a success after a short
//! delay and carries out Stop, Retry and Dismiss.

mod controller;
mod view;

pub use controller::{BannerClock, BannerController};
pub use view::{BannerView, FAILURE_MESSAGE, RUNNING_LABEL, SUCCESS_MESSAGE, render};
