use crate::domain::correlation::events::{ApplicationEnded, JobEnded, JobStarted, StageCompleted, UnitCompleted, UnitStarted};
use crate::error::Result;

/// Callbacks a correlator receives from the event dispatcher.
///
/// Every hook defaults to doing nothing, so a correlator only implements what it reacts to.
/// Errors are returned to the dispatcher, which logs them and carries on with the next event.
/// Hooks run on the dispatch thread and must not block.
pub trait TraceListener: Send + Sync {
    fn on_job_start(&self, _event: &JobStarted) -> Result<()> {
        Ok(())
    }

    fn on_unit_start(&self, _event: &UnitStarted) -> Result<()> {
        Ok(())
    }

    fn on_unit_end(&self, _event: &UnitCompleted) -> Result<()> {
        Ok(())
    }

    fn on_group_end(&self, _event: &StageCompleted) -> Result<()> {
        Ok(())
    }

    fn on_job_end(&self, _event: &JobEnded) -> Result<()> {
        Ok(())
    }

    fn on_application_end(&self, _event: &ApplicationEnded) -> Result<()> {
        Ok(())
    }
}
