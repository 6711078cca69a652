// Seed script parser
// Converts the SQL text that provisions a store into structured statements
// We use the sqlparser crate to handle the SQL grammar

use super::{Column, DataType, ForeignKey, Schema, Value};
use anyhow::{anyhow, Result};
use sqlparser::ast::{
    ColumnOption, DataType as SqlDataType, Expr, ObjectName, SetExpr, Statement,
    TableConstraint, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// The statements a seed script may contain
#[derive(Debug, Clone)]
pub enum SeedStatement {
    /// CREATE TABLE tablename (col1 TYPE, col2 TYPE, ...)
    CreateTable { name: String, schema: Schema },
    /// INSERT INTO tablename [(cols)] VALUES (...), (...)
    Insert {
        table_name: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Value>>,
    },
}

/// The seed script parser
pub struct ScriptParser;

impl ScriptParser {
    /// Parse a whole script into statements, in order
    /// Identifiers are case-insensitive and normalised to lowercase
    pub fn parse(sql: &str) -> Result<Vec<SeedStatement>> {
        let dialect = GenericDialect {};
        let ast = Parser::parse_sql(&dialect, sql)
            .map_err(|e| anyhow!("SQL parsing error: {}", e))?;

        ast.iter().map(Self::parse_statement).collect()
    }

    fn parse_statement(statement: &Statement) -> Result<SeedStatement> {
        match statement {
            Statement::CreateTable(create_table) => Self::parse_create_table(create_table),
            Statement::Insert(insert) => Self::parse_insert(insert),
            other => Err(anyhow!(
                "Unsupported statement in seed script: {}",
                first_line(&other.to_string())
            )),
        }
    }

    /// Parse CREATE TABLE, including column and table level key constraints
    fn parse_create_table(create_table: &sqlparser::ast::CreateTable) -> Result<SeedStatement> {
        let table_name = object_name(&create_table.name);
        let mut columns = Vec::with_capacity(create_table.columns.len());

        for column_def in &create_table.columns {
            let name = column_def.name.value.to_lowercase();
            let data_type = Self::parse_data_type(&column_def.data_type)?;
            let mut column = Column {
                name,
                data_type,
                primary_key: false,
                nullable: true,
                references: None,
            };

            for option in &column_def.options {
                match &option.option {
                    ColumnOption::Unique {
                        is_primary: true, ..
                    } => {
                        column.primary_key = true;
                        column.nullable = false;
                    }
                    ColumnOption::NotNull => column.nullable = false,
                    ColumnOption::ForeignKey {
                        foreign_table,
                        referred_columns,
                        ..
                    } => {
                        column.references = Some(foreign_key(foreign_table, referred_columns)?);
                    }
                    _ => {}
                }
            }
            columns.push(column);
        }

        for constraint in &create_table.constraints {
            match constraint {
                TableConstraint::PrimaryKey { columns: keys, .. } => {
                    if keys.len() != 1 {
                        return Err(anyhow!(
                            "Table '{}': only single column primary keys are supported",
                            table_name
                        ));
                    }
                    let column = find_column(&mut columns, &table_name, &keys[0].value)?;
                    column.primary_key = true;
                    column.nullable = false;
                }
                TableConstraint::ForeignKey {
                    columns: keys,
                    foreign_table,
                    referred_columns,
                    ..
                } => {
                    if keys.len() != 1 {
                        return Err(anyhow!(
                            "Table '{}': only single column foreign keys are supported",
                            table_name
                        ));
                    }
                    let reference = foreign_key(foreign_table, referred_columns)?;
                    find_column(&mut columns, &table_name, &keys[0].value)?.references =
                        Some(reference);
                }
                _ => {}
            }
        }

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(anyhow!(
                "Table '{}': more than one primary key column",
                table_name
            ));
        }

        Ok(SeedStatement::CreateTable {
            name: table_name,
            schema: Schema::new(columns),
        })
    }

    /// Parse INSERT with one or more VALUES rows
    fn parse_insert(insert: &sqlparser::ast::Insert) -> Result<SeedStatement> {
        let table_name = object_name(&insert.table_name);

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(
                insert
                    .columns
                    .iter()
                    .map(|ident| ident.value.to_lowercase())
                    .collect(),
            )
        };

        let rows = match &insert.source {
            Some(source) => match source.body.as_ref() {
                SetExpr::Values(values) => {
                    if values.rows.is_empty() {
                        return Err(anyhow!("No values provided for '{}'", table_name));
                    }
                    values
                        .rows
                        .iter()
                        .map(|row| Self::parse_values(row))
                        .collect::<Result<Vec<_>>>()?
                }
                _ => return Err(anyhow!("Unsupported INSERT format for '{}'", table_name)),
            },
            None => return Err(anyhow!("No values provided for '{}'", table_name)),
        };

        Ok(SeedStatement::Insert {
            table_name,
            columns,
            rows,
        })
    }

    fn parse_data_type(sql_type: &SqlDataType) -> Result<DataType> {
        match sql_type {
            SqlDataType::Int(_) | SqlDataType::Integer(_) | SqlDataType::BigInt(_) => {
                Ok(DataType::Integer)
            }
            SqlDataType::Float(_) | SqlDataType::Double | SqlDataType::Real => {
                Ok(DataType::Float)
            }
            SqlDataType::Text | SqlDataType::Varchar(_) | SqlDataType::String(_) => {
                Ok(DataType::Text)
            }
            SqlDataType::Boolean => Ok(DataType::Boolean),
            _ => Err(anyhow!("Unsupported data type: {}", sql_type)),
        }
    }

    fn parse_values(exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(Self::parse_value).collect()
    }

    fn parse_value(expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Value(SqlValue::Number(n, _)) => {
                if n.contains(['.', 'e', 'E']) {
                    Ok(Value::Float(n.parse()?))
                } else {
                    Ok(Value::Integer(n.parse()?))
                }
            }
            Expr::Value(SqlValue::SingleQuotedString(s))
            | Expr::Value(SqlValue::DoubleQuotedString(s)) => Ok(Value::Text(s.clone())),
            Expr::Value(SqlValue::Boolean(b)) => Ok(Value::Boolean(*b)),
            Expr::Value(SqlValue::Null) => Ok(Value::Null),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match Self::parse_value(expr)? {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(anyhow!("Cannot negate {}", other)),
            },
            Expr::Nested(inner) => Self::parse_value(inner),
            _ => Err(anyhow!("Unsupported value expression: {}", expr)),
        }
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|i| i.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

fn foreign_key(table: &ObjectName, columns: &[sqlparser::ast::Ident]) -> Result<ForeignKey> {
    let table = object_name(table);
    match columns {
        [column] => Ok(ForeignKey {
            table,
            column: column.value.to_lowercase(),
        }),
        [] => Err(anyhow!(
            "Reference to '{}' must name the referenced column",
            table
        )),
        _ => Err(anyhow!(
            "Reference to '{}': only single column foreign keys are supported",
            table
        )),
    }
}

fn find_column<'a>(columns: &'a mut [Column], table: &str, name: &str) -> Result<&'a mut Column> {
    let name = name.to_lowercase();
    columns
        .iter_mut()
        .find(|c| c.name == name)
        .ok_or_else(|| anyhow!("Table '{}': constraint on unknown column '{}'", table, name))
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}
