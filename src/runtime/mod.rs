//! Injectable runtime collaborators: HTTP client, clock and scheduler.
//!
//! The validator core never talks to the outside world directly. All I/O and
//! time go through these small trait objects so tests can substitute fixed
//! clocks, canned HTTP responses and manual schedulers, and embedders can
//! plug in their own HTTP stacks.

pub mod clock;
pub mod http;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use http::{HttpClient, HttpClientError, HttpResponse, ReqwestHttpClient};
pub use scheduler::{Scheduler, TaskHandle, TokioScheduler};
