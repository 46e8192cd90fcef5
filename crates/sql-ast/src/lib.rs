//! AST types for the relite SQL dialect (§4.3).

mod expression;
mod statement;

pub use expression::{BinaryOp, Expr, InList, UnaryOp};
pub use statement::{
    ColumnDef, ColumnType, CreateCollection, CreateIndex, CreateProcedure, CreateTable,
    CreateTrigger, CreateView, Delete, DropIndex, DropProcedure, DropTable, DropTrigger, DropView,
    FkAction, ForeignKeyDef, FromItem, Insert, Join, JoinKind, OrderByItem, OrderDirection, Select,
    SelectItem, Statement, TriggerEvent, TriggerTiming, Update,
};
