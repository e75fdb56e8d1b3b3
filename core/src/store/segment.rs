use super::{now_text, placeholders, CrmStore, ID_CHUNK};
use crate::{
    error::ChurnResult,
    types::{CustomerId, SegmentId},
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A row of the `segment` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDefinition {
    pub segment_id: SegmentId,
    pub segment_tag: String,
    pub segment_title: String,
    pub color_code: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

/// Assignment count for one segment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentUsage {
    pub segment_tag: String,
    pub segment_title: String,
    pub customer_count: i64,
}

/// A customer currently assigned to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedCustomer {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub visit_count: i64,
    pub total_revenue: f64,
}

// ── Connection-level helpers ───────────────────────────────────
//
// These take a plain Connection so they run unchanged inside a
// Transaction (which derefs to Connection).

fn find_segment_id(conn: &Connection, tag: &str) -> ChurnResult<Option<SegmentId>> {
    let id = conn
        .query_row(
            "SELECT segment_id FROM segment WHERE segment_tag = ?1",
            params![tag],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn segment_ids_for_tags(conn: &Connection, tags: &[&str]) -> ChurnResult<Vec<SegmentId>> {
    let mut ids = Vec::with_capacity(tags.len());
    for tag in tags {
        if let Some(id) = find_segment_id(conn, tag)? {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn delete_assignments(
    conn: &Connection,
    customer_ids: &[CustomerId],
    segment_ids: &[SegmentId],
) -> ChurnResult<usize> {
    if customer_ids.is_empty() || segment_ids.is_empty() {
        return Ok(0);
    }
    let mut removed = 0;
    for chunk in customer_ids.chunks(ID_CHUNK) {
        let sql = format!(
            "DELETE FROM segment_by_customer
             WHERE customer_id IN ({}) AND segment_id IN ({})",
            placeholders(chunk.len()),
            placeholders(segment_ids.len()),
        );
        let bound = chunk.iter().chain(segment_ids.iter());
        removed += conn.execute(&sql, params_from_iter(bound))?;
    }
    Ok(removed)
}

fn insert_missing_assignments(
    conn: &Connection,
    assignments: &[(CustomerId, SegmentId)],
) -> ChurnResult<usize> {
    let assigned_at = now_text();
    let mut exists = conn.prepare(
        "SELECT 1 FROM segment_by_customer WHERE customer_id = ?1 AND segment_id = ?2",
    )?;
    let mut insert = conn.prepare(
        "INSERT INTO segment_by_customer (customer_id, segment_id, assigned_at)
         VALUES (?1, ?2, ?3)",
    )?;
    let mut inserted = 0;
    for (customer_id, segment_id) in assignments {
        // Re-check: removal and insertion are separate scopes in two-phase mode.
        let present = exists
            .query_row(params![customer_id, segment_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !present {
            insert.execute(params![customer_id, segment_id, assigned_at])?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

impl CrmStore {
    // ── Segment definitions ────────────────────────────────────

    pub fn segment_id(&self, tag: &str) -> ChurnResult<Option<SegmentId>> {
        find_segment_id(&self.conn, tag)
    }

    pub fn segment_definition(&self, tag: &str) -> ChurnResult<Option<SegmentDefinition>> {
        let def = self
            .conn
            .query_row(
                "SELECT segment_id, segment_tag, segment_title, color_code, created_at, modified_at
                 FROM segment WHERE segment_tag = ?1",
                params![tag],
                |row| {
                    Ok(SegmentDefinition {
                        segment_id: row.get(0)?,
                        segment_tag: row.get(1)?,
                        segment_title: row.get(2)?,
                        color_code: row.get(3)?,
                        created_at: row.get(4)?,
                        modified_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(def)
    }

    pub fn segment_count(&self) -> ChurnResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM segment", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Return the id for `tag`, inserting the definition first if absent.
    pub fn get_or_create_segment(
        &self,
        tag: &str,
        title: &str,
        color_code: &str,
    ) -> ChurnResult<SegmentId> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(id) = find_segment_id(&tx, tag)? {
            return Ok(id);
        }
        let now = now_text();
        tx.execute(
            "INSERT INTO segment (segment_tag, segment_title, color_code, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![tag, title, color_code, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        log::info!("Created segment {tag} (id={id})");
        Ok(id)
    }

    // ── Assignments ────────────────────────────────────────────

    /// Delete every assignment of `customer_ids` to any of `tags` in one
    /// transaction. Tags without a definition are ignored.
    pub fn remove_assignments(&self, customer_ids: &[CustomerId], tags: &[&str]) -> ChurnResult<usize> {
        if customer_ids.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let segment_ids = segment_ids_for_tags(&tx, tags)?;
        let removed = delete_assignments(&tx, customer_ids, &segment_ids)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Insert each (customer, segment) pair not already present, in one
    /// transaction. Returns the number of rows inserted.
    pub fn insert_assignments(&self, assignments: &[(CustomerId, SegmentId)]) -> ChurnResult<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let inserted = insert_missing_assignments(&tx, assignments)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Removal and insertion under a single transaction.
    /// Returns (removed, inserted).
    pub fn replace_assignments(
        &self,
        customer_ids: &[CustomerId],
        tags: &[&str],
        assignments: &[(CustomerId, SegmentId)],
    ) -> ChurnResult<(usize, usize)> {
        let tx = self.conn.unchecked_transaction()?;
        let segment_ids = segment_ids_for_tags(&tx, tags)?;
        let removed = delete_assignments(&tx, customer_ids, &segment_ids)?;
        let inserted = insert_missing_assignments(&tx, assignments)?;
        tx.commit()?;
        Ok((removed, inserted))
    }

    /// Customer ids assigned to `tag`, ascending.
    pub fn assigned_customers(&self, tag: &str) -> ChurnResult<Vec<CustomerId>> {
        let mut stmt = self.conn.prepare(
            "SELECT sbc.customer_id
             FROM segment_by_customer sbc
             JOIN segment s ON sbc.segment_id = s.segment_id
             WHERE s.segment_tag = ?1
             ORDER BY sbc.customer_id ASC",
        )?;
        let ids = stmt
            .query_map(params![tag], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Every (customer, tag) assignment in the store, ordered.
    pub fn all_assignments(&self) -> ChurnResult<Vec<(CustomerId, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT sbc.customer_id, s.segment_tag
             FROM segment_by_customer sbc
             JOIN segment s ON sbc.segment_id = s.segment_id
             ORDER BY s.segment_tag ASC, sbc.customer_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Statistics ─────────────────────────────────────────────

    /// Assignment counts for every segment definition, largest first.
    pub fn segment_usage(&self) -> ChurnResult<Vec<SegmentUsage>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.segment_tag, s.segment_title, COUNT(sbc.customer_id) AS customer_count
             FROM segment s
             LEFT JOIN segment_by_customer sbc ON s.segment_id = sbc.segment_id
             GROUP BY s.segment_id, s.segment_tag, s.segment_title
             ORDER BY customer_count DESC, s.segment_tag ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SegmentUsage {
                    segment_tag: row.get(0)?,
                    segment_title: row.get(1)?,
                    customer_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest-revenue customers assigned to `tag`.
    pub fn top_customers_in_segment(&self, tag: &str, limit: usize) -> ChurnResult<Vec<AssignedCustomer>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.customer_id, c.customer_name, COALESCE(c.visit_count, 0),
                    COALESCE(c.total_revenue, 0.0)
             FROM customer c
             JOIN segment_by_customer sbc ON c.customer_id = sbc.customer_id
             JOIN segment s ON sbc.segment_id = s.segment_id
             WHERE s.segment_tag = ?1
             ORDER BY c.total_revenue DESC, c.customer_id ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![tag, limit as i64], |row| {
                Ok(AssignedCustomer {
                    customer_id: row.get(0)?,
                    customer_name: row.get(1)?,
                    visit_count: row.get(2)?,
                    total_revenue: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
