use super::CrmStore;
use crate::{error::ChurnResult, types::CustomerId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// One customer's raw facts as read from the upstream tables.
///
/// Dates stay as text here; the feature builder parses them leniently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerFacts {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub visit_count: i64,
    pub total_revenue: f64,
    pub recent_visit_date: Option<String>,
    pub birthdate: Option<String>,
    pub noshow_count: i64,
    pub gender: Option<String>,
    pub marketing_consent: bool,
    pub channel_id: Option<i64>,
    pub created_at: Option<String>,
    pub shop_id: Option<i64>,
    pub shop_name: Option<String>,
    pub total_reservations: i64,
    pub paid_reservations: i64,
    pub noshow_reservations: i64,
    pub cancelled_reservations: i64,
    pub avg_order_value: Option<f64>,
    pub total_sales_amount: Option<f64>,
    pub total_sales_count: i64,
}

/// Insert payload for the upstream `customer` table (fixtures and demos).
#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub customer_id: CustomerId,
    pub shop_id: Option<i64>,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub visit_count: i64,
    pub total_revenue: f64,
    pub recent_visit_date: Option<String>,
    pub birthdate: Option<String>,
    pub noshow_count: i64,
    pub gender: Option<String>,
    pub marketing_consent: bool,
    pub channel_id: Option<i64>,
    pub created_at: Option<String>,
}

impl CrmStore {
    // ── Feature source ─────────────────────────────────────────

    /// Every non-deleted customer joined with its reservation and sales
    /// aggregates. Aggregates are pre-grouped per customer so the two
    /// fact tables never multiply each other's rows.
    pub fn load_customer_facts(&self) -> ChurnResult<Vec<CustomerFacts>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.customer_id, c.customer_name, c.phone_number,
                    COALESCE(c.visit_count, 0), COALESCE(c.total_revenue, 0.0),
                    c.recent_visit_date, c.birthdate, COALESCE(c.noshow_count, 0),
                    c.gender, COALESCE(c.marketing_consent, 0), c.channel_id, c.created_at,
                    s.shop_id, s.shop_name,
                    COALESCE(r.total_reservations, 0),
                    COALESCE(r.paid_reservations, 0),
                    COALESCE(r.noshow_reservations, 0),
                    COALESCE(r.cancelled_reservations, 0),
                    sl.avg_order_value, sl.total_sales_amount,
                    COALESCE(sl.total_sales_count, 0)
             FROM customer c
             LEFT JOIN shop s ON c.shop_id = s.shop_id
             LEFT JOIN (
                 SELECT customer_id,
                        COUNT(*) AS total_reservations,
                        SUM(CASE WHEN reservation_status_name = 'PAID' THEN 1 ELSE 0 END)
                            AS paid_reservations,
                        SUM(CASE WHEN reservation_status_name = 'NO_SHOW' THEN 1 ELSE 0 END)
                            AS noshow_reservations,
                        SUM(CASE WHEN reservation_status_name IN ('CBC', 'CBS') THEN 1 ELSE 0 END)
                            AS cancelled_reservations
                 FROM reservation
                 GROUP BY customer_id
             ) r ON r.customer_id = c.customer_id
             LEFT JOIN (
                 SELECT customer_id,
                        AVG(total_amount) AS avg_order_value,
                        SUM(total_amount) AS total_sales_amount,
                        COUNT(*)          AS total_sales_count
                 FROM sales
                 GROUP BY customer_id
             ) sl ON sl.customer_id = c.customer_id
             WHERE c.deleted_at IS NULL
             ORDER BY c.customer_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CustomerFacts {
                customer_id: row.get(0)?,
                customer_name: row.get(1)?,
                phone_number: row.get(2)?,
                visit_count: row.get(3)?,
                total_revenue: row.get(4)?,
                recent_visit_date: row.get(5)?,
                birthdate: row.get(6)?,
                noshow_count: row.get(7)?,
                gender: row.get(8)?,
                marketing_consent: row.get::<_, i64>(9)? != 0,
                channel_id: row.get(10)?,
                created_at: row.get(11)?,
                shop_id: row.get(12)?,
                shop_name: row.get(13)?,
                total_reservations: row.get(14)?,
                paid_reservations: row.get(15)?,
                noshow_reservations: row.get(16)?,
                cancelled_reservations: row.get(17)?,
                avg_order_value: row.get(18)?,
                total_sales_amount: row.get(19)?,
                total_sales_count: row.get(20)?,
            })
        })?;
        let facts = rows.collect::<Result<Vec<_>, _>>()?;
        log::info!("Loaded {} customers", facts.len());
        Ok(facts)
    }

    // ── Upstream writers (fixtures and demos only) ─────────────

    pub fn insert_shop(&self, shop_id: i64, shop_name: &str) -> ChurnResult<()> {
        self.conn.execute(
            "INSERT INTO shop (shop_id, shop_name) VALUES (?1, ?2)",
            params![shop_id, shop_name],
        )?;
        Ok(())
    }

    pub fn insert_customer(&self, c: &NewCustomer) -> ChurnResult<()> {
        self.conn.execute(
            "INSERT INTO customer (
                customer_id, shop_id, customer_name, phone_number, visit_count,
                total_revenue, recent_visit_date, birthdate, noshow_count, gender,
                marketing_consent, channel_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                c.customer_id,
                c.shop_id,
                &c.customer_name,
                &c.phone_number,
                c.visit_count,
                c.total_revenue,
                &c.recent_visit_date,
                &c.birthdate,
                c.noshow_count,
                &c.gender,
                if c.marketing_consent { 1 } else { 0 },
                c.channel_id,
                &c.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn soft_delete_customer(&self, customer_id: CustomerId, deleted_at: &str) -> ChurnResult<()> {
        self.conn.execute(
            "UPDATE customer SET deleted_at = ?1 WHERE customer_id = ?2",
            params![deleted_at, customer_id],
        )?;
        Ok(())
    }

    pub fn insert_reservation(
        &self,
        customer_id: CustomerId,
        status: &str,
        reserved_at: Option<&str>,
    ) -> ChurnResult<()> {
        self.conn.execute(
            "INSERT INTO reservation (customer_id, reservation_status_name, reserved_at)
             VALUES (?1, ?2, ?3)",
            params![customer_id, status, reserved_at],
        )?;
        Ok(())
    }

    pub fn insert_sale(
        &self,
        customer_id: CustomerId,
        total_amount: f64,
        sales_date: Option<&str>,
    ) -> ChurnResult<()> {
        self.conn.execute(
            "INSERT INTO sales (customer_id, total_amount, sales_date) VALUES (?1, ?2, ?3)",
            params![customer_id, total_amount, sales_date],
        )?;
        Ok(())
    }

    pub fn customer_count(&self) -> ChurnResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM customer WHERE deleted_at IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
