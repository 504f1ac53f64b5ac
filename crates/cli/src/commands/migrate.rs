use crate::commands::{with_database, CommandResult, StepError};
use portaflow_db::migrations;

pub fn run(revert: bool) -> CommandResult {
    let result = with_database("migrate", |pool| async move {
        if revert {
            migrations::revert_to(&pool, 0)
                .await
                .map_err(|error| ("migration_revert", error.to_string(), 5u8))?;
            Ok::<_, StepError>("reverted all applied migrations")
        } else {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;
            Ok::<_, StepError>("applied pending migrations")
        }
    });

    match result {
        Ok(message) => CommandResult::success("migrate", message),
        Err(failure) => failure,
    }
}
