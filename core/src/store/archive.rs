use super::SimStore;
use crate::{
    archive::{ArchiveEntry, PointState},
    error::SimResult,
    types::Step,
};
use rusqlite::params;

impl SimStore {
    // ── Output writer ──────────────────────────────────────────

    /// Write one flush atomically: either every entry lands or none does.
    pub fn write_flush(
        &self,
        run_id: &str,
        flush_index: u64,
        step: Step,
        entries: &[ArchiveEntry],
    ) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let flushed_at = entries.last().map(|e| e.time.to_rfc3339()).unwrap_or_default();
        tx.execute(
            "INSERT INTO archive_flush (run_id, flush_index, step, flushed_at, entries)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, flush_index as i64, step as i64, flushed_at, entries.len() as i64],
        )?;
        {
            let mut entry_stmt = tx.prepare(
                "INSERT INTO archive_entry (run_id, flush_index, step, valid_time, point_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut point_stmt = tx.prepare(
                "INSERT INTO point_state (
                    run_id, step, point_id, lon, lat, pressure, age_seconds, box_height_m
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for entry in entries {
                entry_stmt.execute(params![
                    run_id,
                    flush_index as i64,
                    entry.step as i64,
                    entry.time.to_rfc3339(),
                    entry.points.len() as i64,
                ])?;
                for p in &entry.points {
                    point_stmt.execute(params![
                        run_id,
                        entry.step as i64,
                        p.id as i64,
                        p.lon,
                        p.lat,
                        p.pressure,
                        p.age_seconds,
                        p.box_height_m,
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn flush_count(&self, run_id: &str) -> SimResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM archive_flush WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Entries written by each flush, in flush order.
    pub fn flush_entry_counts(&self, run_id: &str) -> SimResult<Vec<u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT entries FROM archive_flush WHERE run_id = ?1 ORDER BY flush_index ASC",
        )?;
        let counts = stmt
            .query_map(params![run_id], |row| Ok(row.get::<_, i64>(0)? as u64))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    pub fn archived_entry_count(&self, run_id: &str) -> SimResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM archive_entry WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Points archived at `step`, ordered by id.
    pub fn archived_points_at(&self, run_id: &str, step: Step) -> SimResult<Vec<PointState>> {
        let mut stmt = self.conn.prepare(
            "SELECT point_id, lon, lat, pressure, age_seconds, box_height_m
             FROM point_state WHERE run_id = ?1 AND step = ?2
             ORDER BY point_id ASC",
        )?;
        let points = stmt
            .query_map(params![run_id, step as i64], |row| {
                Ok(PointState {
                    id:           row.get::<_, i64>(0)? as u64,
                    lon:          row.get(1)?,
                    lat:          row.get(2)?,
                    pressure:     row.get(3)?,
                    age_seconds:  row.get(4)?,
                    box_height_m: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }
}
