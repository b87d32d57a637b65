use anyhow::Context;
use rusqlite::Connection;

/// Schema migrations, applied in order. Embedded so the binary does not
/// depend on its working directory.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial.sql",
    include_str!("../../migrations/001_initial.sql"),
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_history_is_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO services (name, duration_minutes) VALUES ('Basic', 30);
             INSERT INTO bookings (id, service_id, date, start_time, end_time, status,
                customer_name, customer_email, customer_phone, confirmation_code, created_at, updated_at)
             VALUES ('b1', 1, '2025-06-16', '10:00', '10:30', 'pending', 'A', 'a@x.io', '1', 'ABCD1234',
                '2025-06-01 00:00:00', '2025-06-01 00:00:00');
             INSERT INTO booking_status_history (booking_id, to_status, actor_id, actor_role, created_at)
             VALUES ('b1', 'pending', 'a', 'customer', '2025-06-01 00:00:00');",
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE booking_status_history SET to_status = 'confirmed'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM booking_status_history", []).is_err());
        assert!(conn.execute("DELETE FROM bookings", []).is_err());
    }
}
