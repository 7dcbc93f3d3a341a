//! SeaORM entity models
//!
//! Reference-side tables (roles, users, lecturers, students,
//! achievement_references) and the content document table.

pub(crate) mod achievement_content;
pub(crate) mod achievement_reference;
mod lecturer;
mod role;
mod student;
mod user;

pub use achievement_reference::{
    Entity as ReferenceEntity,
    Model as ReferenceRow,
    ActiveModel as ReferenceActiveModel,
    Column as ReferenceColumn,
};

pub use achievement_content::{
    Entity as ContentEntity,
    Model as ContentRow,
    ActiveModel as ContentActiveModel,
    Column as ContentColumn,
};

pub use student::{
    Entity as StudentEntity,
    Model as StudentRow,
    ActiveModel as StudentActiveModel,
    Column as StudentColumn,
};

pub use lecturer::{
    Entity as LecturerEntity,
    Model as LecturerRow,
    ActiveModel as LecturerActiveModel,
    Column as LecturerColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as UserRow,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use role::{
    Entity as RoleEntity,
    Model as RoleRow,
    ActiveModel as RoleActiveModel,
    Column as RoleColumn,
};
