//! Run orchestration: ramp-up, reactor loop, report.

use crate::config::Config;
use crate::driver::EventDriver;
use crate::error::Result;
use crate::pool::ClientPool;
use crate::protocol::{ParserFactory, RequestTemplate};
use crate::report::Report;

/// Execute one benchmark run to completion and aggregate the report.
///
/// Fatal errors (connection, I/O, protocol) abort the run immediately; there
/// is no retry policy by design. The elapsed clock starts after ramp-up, so
/// connection setup does not count towards throughput.
pub fn run_benchmark(
    title: impl Into<String>,
    cfg: &Config,
    template: RequestTemplate,
    new_parser: ParserFactory,
) -> Result<Report> {
    cfg.validate()?;

    let mut driver = EventDriver::new()?;
    let mut pool = ClientPool::new(title, cfg, template, new_parser);

    pool.fill(&mut driver)?;
    pool.start_clock();
    driver.run(&mut pool)?;

    Ok(pool.into_report())
}
