//! `rindex status` and `rindex delete`.

use anyhow::{bail, Result};

use repo_indexer_core::models::IndexedRepository;

use crate::state::{AppState, DeleteOutcome};

pub async fn run_status(state: &AppState, user_id: &str, repo: Option<&str>) -> Result<()> {
    let records = match repo {
        Some(repo) => match state.status.get_status(user_id, repo).await? {
            Some(record) => vec![record],
            None => bail!("{} has not been indexed for user {}", repo, user_id),
        },
        None => state.status.list_statuses(user_id).await?,
    };

    if records.is_empty() {
        println!("No indexed repositories.");
        return Ok(());
    }
    print!("{}", format_status_table(&records));

    for record in records.iter().filter(|r| r.error_message.is_some()) {
        if let Some(message) = &record.error_message {
            println!("\n{}: {}", record.repo_full_name, message);
        }
    }
    Ok(())
}

pub async fn run_delete(state: &AppState, user_id: &str, repo: &str) -> Result<()> {
    match state.delete_repository(repo, user_id).await? {
        DeleteOutcome::Deleted { chunks } => {
            println!("Deleted {} ({} chunks).", repo, chunks);
            Ok(())
        }
        DeleteOutcome::NotFound => bail!("{} has not been indexed for user {}", repo, user_id),
        DeleteOutcome::Active => bail!("{} is being indexed; try again when the run ends", repo),
    }
}

fn format_status_table(records: &[IndexedRepository]) -> String {
    let mut out = format!(
        "{:<40} {:<10} {:>5} {:>13} {:<10} {}\n",
        "REPOSITORY", "STATUS", "PROG", "FILES", "BRANCH", "LAST INDEXED"
    );
    for record in records {
        let files = format!("{}/{}", record.indexed_files, record.total_files);
        let last = record
            .last_indexed_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let branch = if record.branch.is_empty() {
            "-"
        } else {
            record.branch.as_str()
        };
        out.push_str(&format!(
            "{:<40} {:<10} {:>4}% {:>13} {:<10} {}\n",
            record.repo_full_name,
            record.status.as_str(),
            record.progress,
            files,
            branch,
            last
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use repo_indexer_core::models::IndexStatus;

    #[test]
    fn table_has_one_row_per_record() {
        let mut done =
            IndexedRepository::pending("u1", "acme/app", "https://github.com/acme/app", 0);
        done.status = IndexStatus::Completed;
        done.progress = 100;
        done.total_files = 12;
        done.indexed_files = 12;
        done.branch = "main".to_string();
        done.last_indexed_at = chrono::Utc.timestamp_opt(1_700_000_000, 0).single();
        let pending =
            IndexedRepository::pending("u1", "acme/lib", "https://github.com/acme/lib", 0);

        let table = format_status_table(&[done, pending]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("REPOSITORY"));
        assert!(lines[1].contains("COMPLETED") && lines[1].contains("100%"));
        assert!(lines[1].contains("12/12") && lines[1].contains("2023-11-14"));
        assert!(lines[2].contains("PENDING") && lines[2].ends_with('-'));
    }
}
