//! Readiness backends. One is selected at compile time as [`DefaultPoller`];
//! both implement the same [`Poller`](crate::driver::Poller) contract.

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod epoll;
pub mod poll;

#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "poll-backend")
))]
pub use self::epoll::EpollPoller as DefaultPoller;

#[cfg(not(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "poll-backend")
)))]
pub use self::poll::PollPoller as DefaultPoller;
