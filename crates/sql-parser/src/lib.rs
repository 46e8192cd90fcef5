//! Recursive-descent parser producing `relite-sql-ast` statements (§4.3).

mod error;
mod parser;

pub use error::ParseError;
pub use parser::{parse_script, parse_statement, Parser};

#[cfg(test)]
mod tests {
    use super::*;
    use relite_sql_ast::*;

    #[test]
    fn parses_simple_select() {
        let stmt = parse_statement("SELECT name, age FROM users WHERE age > 18").unwrap();
        match stmt {
            Statement::Select(select) => {
                assert_eq!(select.columns.len(), 2);
                assert_eq!(select.from.len(), 1);
                assert_eq!(select.from[0].table, "users");
                assert!(select.filter.is_some());
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn parses_insert_with_multiple_rows_and_placeholders() {
        let stmt = parse_statement("INSERT INTO t (a, b) VALUES (?, ?), (?, ?)").unwrap();
        let Statement::Insert(insert) = stmt else { panic!("expected insert") };
        assert_eq!(insert.values.len(), 2);
        assert_eq!(insert.values[0][0], Expr::Placeholder(0));
        assert_eq!(insert.values[0][1], Expr::Placeholder(1));
        assert_eq!(insert.values[1][0], Expr::Placeholder(2));
        assert_eq!(insert.values[1][1], Expr::Placeholder(3));
    }

    #[test]
    fn parses_create_table_with_constraints() {
        let stmt = parse_statement(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, email TEXT UNIQUE NOT NULL, age INTEGER DEFAULT 0)",
        )
        .unwrap();
        let Statement::CreateTable(create) = stmt else { panic!("expected create table") };
        assert_eq!(create.columns.len(), 3);
        assert!(create.columns[0].primary_key);
        assert!(create.columns[1].unique && create.columns[1].not_null);
        assert!(create.columns[2].default.is_some());
    }

    #[test]
    fn parses_left_join() {
        let stmt = parse_statement("SELECT u.name, o.item FROM u LEFT JOIN o ON u.id = o.uid").unwrap();
        let Statement::Select(select) = stmt else { panic!("expected select") };
        assert_eq!(select.joins.len(), 1);
        assert_eq!(select.joins[0].kind, JoinKind::Left);
    }

    #[test]
    fn parses_right_join() {
        let stmt = parse_statement("SELECT u.name, o.item FROM u RIGHT JOIN o ON u.id = o.uid").unwrap();
        let Statement::Select(select) = stmt else { panic!("expected select") };
        assert_eq!(select.joins[0].kind, JoinKind::Right);
    }

    #[test]
    fn parses_scalar_subquery_in_where() {
        let stmt = parse_statement("SELECT id FROM t WHERE id = (SELECT MAX(id) FROM t)").unwrap();
        let Statement::Select(select) = stmt else { panic!("expected select") };
        match select.filter {
            Some(Expr::Binary { right, .. }) => assert!(matches!(*right, Expr::Subquery(_))),
            other => panic!("expected a binary filter, got {other:?}"),
        }
    }

    #[test]
    fn parses_group_by_and_order_by() {
        let stmt =
            parse_statement("SELECT cat, SUM(amt) FROM sales GROUP BY cat ORDER BY SUM(amt) DESC").unwrap();
        let Statement::Select(select) = stmt else { panic!("expected select") };
        assert_eq!(select.group_by.len(), 1);
        assert_eq!(select.order_by[0].direction, OrderDirection::Desc);
    }

    #[test]
    fn parses_trigger_with_body() {
        let stmt = parse_statement(
            "CREATE TRIGGER t1 AFTER INSERT ON orders BEGIN UPDATE stock SET qty = qty - 1 WHERE id = 1; END",
        )
        .unwrap();
        let Statement::CreateTrigger(trigger) = stmt else { panic!("expected create trigger") };
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert_eq!(trigger.event, TriggerEvent::Insert);
        assert_eq!(trigger.body.len(), 1);
    }

    #[test]
    fn parses_json_path_operator() {
        let stmt = parse_statement("SELECT doc -> 'name' FROM things").unwrap();
        let Statement::Select(select) = stmt else { panic!("expected select") };
        assert!(matches!(
            &select.columns[0],
            SelectItem::Expr { expr: Expr::JsonPath { as_text: false, .. }, .. }
        ));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_statement("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn parses_script_of_multiple_statements() {
        let stmts = parse_script("BEGIN; INSERT INTO t VALUES (1); COMMIT;").unwrap();
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0], Statement::Begin);
        assert_eq!(stmts[2], Statement::Commit);
    }
}
