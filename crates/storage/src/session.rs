use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::db::DbPool;

/// Whether a batch run commits its work or previews it. Dry-run executes
/// every statement inside the transaction and then rolls it back, so the
/// diagnostics are identical to a write run with zero persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Write,
}

impl RunMode {
    pub fn is_write(self) -> bool {
        self == RunMode::Write
    }

    pub fn label(self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::Write => "write",
        }
    }
}

/// One atomic unit of batch work: a transaction plus the run mode that
/// decides its fate. Acquire at batch (or chunk) start, finish at the end;
/// a failure mid-way leaves no partial state either way.
pub struct Session {
    tx: Transaction<'static, Sqlite>,
    mode: RunMode,
}

impl Session {
    pub async fn begin(pool: &DbPool, mode: RunMode) -> Result<Self, sqlx::Error> {
        Ok(Session {
            tx: pool.begin().await?,
            mode,
        })
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit in write mode, roll back in dry-run. Returns whether the
    /// work was committed.
    pub async fn finish(self) -> Result<bool, sqlx::Error> {
        match self.mode {
            RunMode::Write => {
                self.tx.commit().await?;
                Ok(true)
            }
            RunMode::DryRun => {
                tracing::debug!("dry-run session rolled back");
                self.tx.rollback().await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;

    async fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    async fn charter_count(pool: &DbPool) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM charters")
            .fetch_one(pool)
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn dry_run_rolls_back() {
        let (_dir, pool) = test_pool().await;
        let mut session = Session::begin(&pool, RunMode::DryRun).await.unwrap();
        sqlx::query("INSERT INTO charters (reserve_number) VALUES ('R-1')")
            .execute(session.conn())
            .await
            .unwrap();
        let committed = session.finish().await.unwrap();
        assert!(!committed);
        assert_eq!(charter_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn write_mode_commits() {
        let (_dir, pool) = test_pool().await;
        let mut session = Session::begin(&pool, RunMode::Write).await.unwrap();
        sqlx::query("INSERT INTO charters (reserve_number) VALUES ('R-1')")
            .execute(session.conn())
            .await
            .unwrap();
        let committed = session.finish().await.unwrap();
        assert!(committed);
        assert_eq!(charter_count(&pool).await, 1);
    }
}
