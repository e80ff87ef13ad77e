use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use empload_core::{BatchRecords, Department};

use crate::error::StoreError;

/// Bind parameters PostgreSQL accepts in one statement.
const MAX_BIND_PARAMS: usize = 65_535;

const SCHEMA: &[&str] = &[
    r#"
    create table if not exists departments (
      code char(4) primary key,
      name varchar(40) not null unique,
      budget bigint not null
    )
    "#,
    r#"
    create table if not exists employees (
      identifier bigint primary key,
      birth_date date not null,
      first_name varchar(64) not null,
      last_name varchar(64) not null,
      gender char(1) not null check (gender in ('M', 'F')),
      hire_date date not null,
      profile jsonb
    )
    "#,
    r#"
    create table if not exists salaries (
      employee_identifier bigint not null references employees (identifier) on delete cascade,
      amount bigint not null check (amount > 0),
      valid_from date not null,
      valid_to date not null,
      details jsonb,
      check (valid_from < valid_to)
    )
    "#,
    r#"
    create index if not exists salaries_employee_idx
      on salaries (employee_identifier, valid_from)
    "#,
    r#"
    create table if not exists department_assignments (
      employee_identifier bigint not null references employees (identifier) on delete cascade,
      department_code char(4) not null references departments (code),
      valid_from date not null,
      valid_to date not null,
      primary key (employee_identifier, department_code, valid_from),
      check (valid_from < valid_to)
    )
    "#,
];

pub async fn create_schema(conn: &mut PgConnection) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn seed_departments(
    conn: &mut PgConnection,
    departments: &[Department],
) -> Result<(), StoreError> {
    if departments.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("insert into departments (code, name, budget) ");
    builder.push_values(departments, |mut row, dept| {
        row.push_bind(dept.code.as_str())
            .push_bind(dept.name.as_str())
            .push_bind(dept.budget);
    });
    builder.push(" on conflict do nothing");
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

pub async fn count_employees(conn: &mut PgConnection) -> Result<u64, StoreError> {
    let count = sqlx::query_scalar::<_, i64>("select count(*) from employees")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count.max(0) as u64)
}

/// Insert the batch rows, parents first. The caller owns the transaction.
pub async fn insert_records(
    conn: &mut PgConnection,
    records: &BatchRecords,
) -> Result<(), StoreError> {
    for chunk in records.employees.chunks(MAX_BIND_PARAMS / 7) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "insert into employees \
             (identifier, birth_date, first_name, last_name, gender, hire_date, profile) ",
        );
        builder.push_values(chunk, |mut row, employee| {
            row.push_bind(employee.id.get())
                .push_bind(employee.birth_date)
                .push_bind(employee.first_name.as_str())
                .push_bind(employee.last_name.as_str())
                .push_bind(employee.gender.code())
                .push_bind(employee.hire_date)
                .push_bind(employee.profile.as_ref().map(|p| Json(p.to_document())));
        });
        builder.build().execute(&mut *conn).await?;
    }

    for chunk in records.salaries.chunks(MAX_BIND_PARAMS / 5) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "insert into salaries (employee_identifier, amount, valid_from, valid_to, details) ",
        );
        builder.push_values(chunk, |mut row, salary| {
            row.push_bind(salary.employee_id.get())
                .push_bind(salary.amount)
                .push_bind(salary.valid_from)
                .push_bind(salary.valid_to)
                .push_bind(salary.details.as_ref().map(|p| Json(p.to_document())));
        });
        builder.build().execute(&mut *conn).await?;
    }

    for chunk in records.assignments.chunks(MAX_BIND_PARAMS / 4) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "insert into department_assignments \
             (employee_identifier, department_code, valid_from, valid_to) ",
        );
        builder.push_values(chunk, |mut row, assignment| {
            row.push_bind(assignment.employee_id.get())
                .push_bind(assignment.department_code.as_str())
                .push_bind(assignment.valid_from)
                .push_bind(assignment.valid_to);
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn analyze(conn: &mut PgConnection) -> Result<(), StoreError> {
    sqlx::query("analyze employees, salaries, department_assignments")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn current_setting(conn: &mut PgConnection, name: &str) -> Result<String, StoreError> {
    let value = sqlx::query_scalar::<_, String>("select current_setting($1)")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(value)
}

/// Session-scoped `set_config`. Returns the raw driver error so callers can
/// inspect the SQLSTATE.
pub async fn set_config(conn: &mut PgConnection, name: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query("select set_config($1, $2, false)")
        .bind(name)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
