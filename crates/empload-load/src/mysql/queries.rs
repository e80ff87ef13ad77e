use sqlx::types::Json;
use sqlx::{MySql, MySqlConnection, QueryBuilder};

use empload_core::{BatchRecords, Department};

use crate::error::StoreError;

/// Placeholders MySQL accepts in one prepared statement.
const MAX_BIND_PARAMS: usize = 65_535;

const SCHEMA: &[&str] = &[
    r#"
    create table if not exists departments (
      code char(4) primary key,
      name varchar(40) not null unique,
      budget bigint not null
    ) engine = InnoDB
    "#,
    r#"
    create table if not exists employees (
      identifier bigint primary key,
      birth_date date not null,
      first_name varchar(64) not null,
      last_name varchar(64) not null,
      gender enum('M', 'F') not null,
      hire_date date not null,
      profile json
    ) engine = InnoDB
    "#,
    r#"
    create table if not exists salaries (
      employee_identifier bigint not null,
      amount bigint not null,
      valid_from date not null,
      valid_to date not null,
      details json,
      index salaries_employee_idx (employee_identifier, valid_from),
      constraint salaries_employee_fk foreign key (employee_identifier)
        references employees (identifier) on delete cascade,
      constraint salaries_amount_positive check (amount > 0),
      constraint salaries_interval check (valid_from < valid_to)
    ) engine = InnoDB
    "#,
    r#"
    create table if not exists department_assignments (
      employee_identifier bigint not null,
      department_code char(4) not null,
      valid_from date not null,
      valid_to date not null,
      primary key (employee_identifier, department_code, valid_from),
      constraint assignments_employee_fk foreign key (employee_identifier)
        references employees (identifier) on delete cascade,
      constraint assignments_department_fk foreign key (department_code)
        references departments (code),
      constraint assignments_interval check (valid_from < valid_to)
    ) engine = InnoDB
    "#,
];

pub async fn create_schema(conn: &mut MySqlConnection) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn seed_departments(
    conn: &mut MySqlConnection,
    departments: &[Department],
) -> Result<(), StoreError> {
    if departments.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new("insert into departments (code, name, budget) ");
    builder.push_values(departments, |mut row, dept| {
        row.push_bind(dept.code.as_str())
            .push_bind(dept.name.as_str())
            .push_bind(dept.budget);
    });
    builder.push(" on duplicate key update code = code");
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

pub async fn count_employees(conn: &mut MySqlConnection) -> Result<u64, StoreError> {
    let count = sqlx::query_scalar::<_, i64>("select count(*) from employees")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count.max(0) as u64)
}

/// Insert the batch rows, parents first. The caller owns the transaction.
pub async fn insert_records(
    conn: &mut MySqlConnection,
    records: &BatchRecords,
) -> Result<(), StoreError> {
    for chunk in records.employees.chunks(MAX_BIND_PARAMS / 7) {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
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
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
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
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
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

pub async fn analyze(conn: &mut MySqlConnection) -> Result<(), StoreError> {
    sqlx::query("analyze table employees, salaries, department_assignments")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Read a system variable as text. `variable` must be a trusted
/// `@@scope.name` reference.
pub async fn read_variable(conn: &mut MySqlConnection, variable: &str) -> Result<String, StoreError> {
    let value = sqlx::query_scalar::<_, String>(&format!("select cast({variable} as char)"))
        .fetch_one(&mut *conn)
        .await?;
    Ok(value)
}

/// Assign a system variable. Both parts must come from trusted constants or
/// be validated as plain integers by the caller.
pub async fn set_variable(
    conn: &mut MySqlConnection,
    variable: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("set {variable} = {value}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}
