/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Fan-out-then-join over controller futures: every lifecycle step
//! dispatches to all attached controllers in parallel, awaits every
//! one of them, and composes a single joined error from the failures.

use crate::controllers::ControllerError;
use tokio::task::JoinHandle;

/// The sentinel a cancelled controller future contributes to a joined
/// error.
pub(crate) const DISCARDED: &str = "discarded";

/// Awaits every spawned controller future, successful or not. Failures
/// are flattened to strings so they can be joined; a cancelled task
/// becomes [DISCARDED].
pub(crate) async fn await_all<T>(
    tasks: Vec<JoinHandle<Result<T, ControllerError>>>,
) -> Vec<Result<T, String>> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_cancelled() => Err(DISCARDED.to_string()),
            Err(e) => Err(e.to_string()),
        });
    }
    results
}

/// Joins the failures out of [await_all] results, or `None` when every
/// future succeeded.
pub(crate) fn join_errors<T>(results: &[Result<T, String>]) -> Option<String> {
    let errors: Vec<&str> = results
        .iter()
        .filter_map(|result| result.as_ref().err().map(String::as_str))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(errors.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroups2::CgroupsError;
    use std::path::PathBuf;

    fn fail(message: &str) -> ControllerError {
        ControllerError::Cgroups(CgroupsError::ControllerNotAvailable {
            controller: message.to_string(),
            cgroup: PathBuf::from("/root"),
        })
    }

    #[tokio::test]
    async fn test_await_all_collects_every_result() {
        let tasks = vec![
            tokio::spawn(async { Ok(1) }),
            tokio::spawn(async { Err(fail("cpu")) }),
            tokio::spawn(async { Ok(3) }),
        ];

        let results = await_all(tasks).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(1));
        assert!(results[1].as_ref().is_err_and(|e| e.contains("cpu")));

        let joined = join_errors(&results).expect("one failure");
        assert!(joined.contains("cpu"));
    }

    #[tokio::test]
    async fn test_aborted_task_is_discarded() {
        let task: JoinHandle<Result<(), ControllerError>> =
            tokio::spawn(async {
                std::future::pending::<()>().await;
                Ok(())
            });
        task.abort();

        let results = await_all(vec![task]).await;
        assert_eq!(join_errors(&results), Some(DISCARDED.to_string()));
    }

    #[tokio::test]
    async fn test_no_errors_joins_to_none() {
        let tasks = vec![tokio::spawn(async { Ok(()) })];

        let results = await_all(tasks).await;
        assert_eq!(join_errors(&results), None);
    }
}
