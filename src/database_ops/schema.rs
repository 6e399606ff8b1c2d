//! Table catalogues and DDL for the two load pipelines.
//!
//! The column catalogue drives value coercion and parameter typing in the
//! loader; the DDL strings are the authoritative table definitions.
use anyhow::{anyhow, Result};
use itertools::Itertools;
use sqlx::PgConnection;
use tracing::{debug, info, instrument};

use crate::normalization::SqlType;

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: SqlType,
}

const fn col(name: &'static str, ty: SqlType) -> ColumnDef {
    ColumnDef { name, ty }
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    /// Case-insensitive, matching how Postgres folds unquoted identifiers.
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn column_list(&self) -> String {
        self.columns.iter().map(|c| c.name).join(", ")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub name: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub referenced_column: &'static str,
}

impl ForeignKey {
    pub fn add_sql(&self) -> String {
        format!(
            "ALTER TABLE IF EXISTS {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
            self.table, self.name, self.column, self.references, self.referenced_column
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaDef {
    pub name: &'static str,
    pub ddl: &'static str,
    pub tables: &'static [TableDef],
    /// Constraints that must exist before any rows are written.
    pub foreign_keys: &'static [ForeignKey],
    /// Constraints added once staging data has been promoted.
    pub deferred_foreign_keys: &'static [ForeignKey],
}

impl SchemaDef {
    pub fn table(&self, name: &str) -> Result<&'static TableDef> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow!("schema {} has no table {}", self.name, name))
    }

    /// Run the DDL and add the load-time foreign keys.
    #[instrument(skip(self, conn), fields(schema = self.name))]
    pub async fn create(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::raw_sql(self.ddl).execute(&mut *conn).await?;
        let added = ensure_foreign_keys(conn, self.foreign_keys).await?;
        info!(tables = self.tables.len(), fks_added = added, "schema ready");
        Ok(())
    }

    pub async fn add_deferred_foreign_keys(&self, conn: &mut PgConnection) -> Result<()> {
        let added = ensure_foreign_keys(conn, self.deferred_foreign_keys).await?;
        info!(schema = self.name, fks_added = added, "deferred foreign keys in place");
        Ok(())
    }
}

/// Returns how many constraints were actually created.
async fn ensure_foreign_keys(conn: &mut PgConnection, fks: &[ForeignKey]) -> Result<usize> {
    let mut added = 0;
    for fk in fks {
        if ensure_foreign_key(conn, fk).await? {
            added += 1;
        }
    }
    Ok(added)
}

/// Add `fk` unless a constraint with that name already exists. Returns
/// whether the constraint was created.
pub async fn ensure_foreign_key(conn: &mut PgConnection, fk: &ForeignKey) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = $1)")
            .persistent(false)
            .bind(fk.name)
            .fetch_one(&mut *conn)
            .await?;
    if exists {
        debug!(constraint = fk.name, "foreign key already present");
        return Ok(false);
    }
    sqlx::raw_sql(&fk.add_sql()).execute(&mut *conn).await?;
    debug!(constraint = fk.name, table = fk.table, "foreign key added");
    Ok(true)
}

// --------- transactions pipeline ---------

const TRANSACTIONS_DDL: &str = "
CREATE TABLE IF NOT EXISTS transaction (
    id BIGINT PRIMARY KEY,
    customer_id BIGINT NOT NULL,
    product_id BIGINT NOT NULL,
    online_order BOOLEAN,
    order_status VARCHAR NOT NULL CHECK (order_status IN
    ('Approved', 'Cancelled')
    ),
    transaction_date DATE NOT NULL,
    list_price FLOAT NOT NULL,
    standard_cost FLOAT
);

CREATE TABLE IF NOT EXISTS customer (
    id BIGINT PRIMARY KEY,
    first_name VARCHAR NOT NULL,
    last_name VARCHAR,
    gender VARCHAR NOT NULL,
    date_of_birthday DATE,
    job_id INTEGER NOT NULL,
    deceased_indicator CHAR(1) NOT NULL,
    owns_car VARCHAR NOT NULL CHECK (owns_car IN ('Yes','No')),
    address TEXT NOT NULL,
    postal_object_id INTEGER NOT NULL,
    property_valuation INTEGER NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS product_id_seq;

CREATE TABLE IF NOT EXISTS product (
    id BIGINT PRIMARY KEY DEFAULT nextval('product_id_seq'),
    product_number INTEGER NOT NULL,
    brand VARCHAR,
    product_line VARCHAR,
    product_class VARCHAR CHECK (product_class IN
    ('low', 'medium', 'high')
    ),
    product_size VARCHAR CHECK (product_size IN
    ('small', 'medium', 'large')
    )
);

CREATE SEQUENCE IF NOT EXISTS job_id_seq;

CREATE TABLE IF NOT EXISTS job (
  id INTEGER PRIMARY KEY DEFAULT nextval('job_id_seq'),
  job_title VARCHAR,
  job_industry_category VARCHAR NOT NULL,
  wealth_segment VARCHAR NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS postal_object_id_seq;

CREATE TABLE IF NOT EXISTS postal_object (
  id INTEGER PRIMARY KEY DEFAULT nextval('postal_object_id_seq'),
  postcode INTEGER NOT NULL,
  state VARCHAR NOT NULL,
  country VARCHAR NOT NULL
);
";

pub static TRANSACTIONS: SchemaDef = SchemaDef {
    name: "transactions",
    ddl: TRANSACTIONS_DDL,
    tables: &[
        TableDef {
            name: "transaction",
            columns: &[
                col("id", SqlType::BigInt),
                col("customer_id", SqlType::BigInt),
                col("product_id", SqlType::BigInt),
                col("online_order", SqlType::Boolean),
                col("order_status", SqlType::Text),
                col("transaction_date", SqlType::Date),
                col("list_price", SqlType::Float),
                col("standard_cost", SqlType::Float),
            ],
        },
        TableDef {
            name: "customer",
            columns: &[
                col("id", SqlType::BigInt),
                col("first_name", SqlType::Text),
                col("last_name", SqlType::Text),
                col("gender", SqlType::Text),
                col("date_of_birthday", SqlType::Date),
                col("job_id", SqlType::Integer),
                col("deceased_indicator", SqlType::Text),
                col("owns_car", SqlType::Text),
                col("address", SqlType::Text),
                col("postal_object_id", SqlType::Integer),
                col("property_valuation", SqlType::Integer),
            ],
        },
        TableDef {
            name: "product",
            columns: &[
                col("id", SqlType::BigInt),
                col("product_number", SqlType::Integer),
                col("brand", SqlType::Text),
                col("product_line", SqlType::Text),
                col("product_class", SqlType::Text),
                col("product_size", SqlType::Text),
            ],
        },
        TableDef {
            name: "job",
            columns: &[
                col("id", SqlType::Integer),
                col("job_title", SqlType::Text),
                col("job_industry_category", SqlType::Text),
                col("wealth_segment", SqlType::Text),
            ],
        },
        TableDef {
            name: "postal_object",
            columns: &[
                col("id", SqlType::Integer),
                col("postcode", SqlType::Integer),
                col("state", SqlType::Text),
                col("country", SqlType::Text),
            ],
        },
    ],
    foreign_keys: &[
        ForeignKey {
            name: "fk_transaction_customer",
            table: "transaction",
            column: "customer_id",
            references: "customer",
            referenced_column: "id",
        },
        ForeignKey {
            name: "fk_transaction_product",
            table: "transaction",
            column: "product_id",
            references: "product",
            referenced_column: "id",
        },
        ForeignKey {
            name: "fk_customer_job",
            table: "customer",
            column: "job_id",
            references: "job",
            referenced_column: "id",
        },
        ForeignKey {
            name: "fk_customer_postal_object",
            table: "customer",
            column: "postal_object_id",
            references: "postal_object",
            referenced_column: "id",
        },
    ],
    deferred_foreign_keys: &[],
};

// --------- orders pipeline ---------

const ORDERS_DDL: &str = "
ALTER TABLE IF EXISTS order_items DROP CONSTRAINT IF EXISTS fk_order_items;
ALTER TABLE IF EXISTS orders DROP CONSTRAINT IF EXISTS fk_order_customer;
DROP TABLE IF EXISTS order_items;
DROP TABLE IF EXISTS orders;
DROP TABLE IF EXISTS customer;
DROP TABLE IF EXISTS product_temp;
DROP TABLE IF EXISTS product;

CREATE TABLE IF NOT EXISTS customer (
    customer_id BIGINT PRIMARY KEY,
    first_name VARCHAR NOT NULL,
    last_name VARCHAR,
    gender VARCHAR NOT NULL,
    DOB DATE,
    job_title VARCHAR,
    job_industry_category VARCHAR NOT NULL,
    wealth_segment VARCHAR NOT NULL,
    deceased_indicator CHAR(1) NOT NULL,
    owns_car VARCHAR NOT NULL CHECK (owns_car IN ('Yes','No')),
    address TEXT NOT NULL,
    postcode INTEGER NOT NULL,
    state VARCHAR NOT NULL,
    country VARCHAR NOT NULL,
    property_valuation INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS product_temp (
    product_id BIGINT NOT NULL,
    brand VARCHAR,
    product_line VARCHAR,
    product_class VARCHAR CHECK (product_class IN
    ('low', 'medium', 'high')
    ),
    product_size VARCHAR CHECK (product_size IN
    ('small', 'medium', 'large')
    ),
    list_price FLOAT NOT NULL,
    standard_cost FLOAT
);

CREATE TABLE IF NOT EXISTS product (
    product_id BIGINT PRIMARY KEY,
    brand VARCHAR,
    product_line VARCHAR,
    product_class VARCHAR CHECK (product_class IN
    ('low', 'medium', 'high')
    ),
    product_size VARCHAR CHECK (product_size IN
    ('small', 'medium', 'large')
    ),
    list_price FLOAT NOT NULL,
    standard_cost FLOAT
);

CREATE TABLE IF NOT EXISTS orders (
  order_id BIGINT PRIMARY KEY,
  customer_id BIGINT NOT NULL,
  order_date DATE NOT NULL,
  online_order BOOLEAN,
  order_status VARCHAR NOT NULL CHECK (order_status IN
  ('Approved', 'Cancelled')
  )
);

CREATE TABLE IF NOT EXISTS order_items (
  order_item_id BIGINT NOT NULL,
  order_id BIGINT NOT NULL,
  product_id BIGINT NOT NULL,
  quantity INTEGER NOT NULL,
  item_list_price_at_sale FLOAT NOT NULL,
  item_standard_cost_at_sale FLOAT
);
";

const PRODUCT_COLUMNS: &[ColumnDef] = &[
    col("product_id", SqlType::BigInt),
    col("brand", SqlType::Text),
    col("product_line", SqlType::Text),
    col("product_class", SqlType::Text),
    col("product_size", SqlType::Text),
    col("list_price", SqlType::Float),
    col("standard_cost", SqlType::Float),
];

pub static ORDERS: SchemaDef = SchemaDef {
    name: "orders",
    ddl: ORDERS_DDL,
    tables: &[
        TableDef {
            name: "customer",
            columns: &[
                col("customer_id", SqlType::BigInt),
                col("first_name", SqlType::Text),
                col("last_name", SqlType::Text),
                col("gender", SqlType::Text),
                col("DOB", SqlType::Date),
                col("job_title", SqlType::Text),
                col("job_industry_category", SqlType::Text),
                col("wealth_segment", SqlType::Text),
                col("deceased_indicator", SqlType::Text),
                col("owns_car", SqlType::Text),
                col("address", SqlType::Text),
                col("postcode", SqlType::Integer),
                col("state", SqlType::Text),
                col("country", SqlType::Text),
                col("property_valuation", SqlType::Integer),
            ],
        },
        TableDef {
            name: "product_temp",
            columns: PRODUCT_COLUMNS,
        },
        TableDef {
            name: "product",
            columns: PRODUCT_COLUMNS,
        },
        TableDef {
            name: "orders",
            columns: &[
                col("order_id", SqlType::BigInt),
                col("customer_id", SqlType::BigInt),
                col("order_date", SqlType::Date),
                col("online_order", SqlType::Boolean),
                col("order_status", SqlType::Text),
            ],
        },
        TableDef {
            name: "order_items",
            columns: &[
                col("order_item_id", SqlType::BigInt),
                col("order_id", SqlType::BigInt),
                col("product_id", SqlType::BigInt),
                col("quantity", SqlType::Integer),
                col("item_list_price_at_sale", SqlType::Float),
                col("item_standard_cost_at_sale", SqlType::Float),
            ],
        },
    ],
    foreign_keys: &[ForeignKey {
        name: "fk_order_items_order",
        table: "order_items",
        column: "order_id",
        references: "orders",
        referenced_column: "order_id",
    }],
    deferred_foreign_keys: &[
        ForeignKey {
            name: "fk_order_customer",
            table: "orders",
            column: "customer_id",
            references: "customer",
            referenced_column: "customer_id",
        },
        ForeignKey {
            name: "fk_order_items_product",
            table: "order_items",
            column: "product_id",
            references: "product",
            referenced_column: "product_id",
        },
    ],
};

pub static SCHEMAS: [&SchemaDef; 2] = [&TRANSACTIONS, &ORDERS];
