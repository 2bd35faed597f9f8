//! Object model for Tekton documents
//!
//! Only the fields that carry a contract (params, results, workspaces,
//! references) are typed. Everything else is ignored on read.

pub mod meta;
pub mod param;
pub mod pipeline;
pub mod run;
pub mod task;

pub use meta::{ObjectMeta, TypeMeta};
pub use param::{Param, ParamSpec, ParamType, ParamValue, PropertySpec};
pub use pipeline::{
    EmbeddedTask, Matrix, MatrixInclude, Pipeline, PipelineResult, PipelineSpec, PipelineTask,
    PipelineWorkspaceDeclaration, TaskRef, WhenExpression, WorkspacePipelineTaskBinding,
};
pub use run::{PipelineRef, PipelineRun, PipelineRunSpec, WorkspaceBinding};
pub use task::{EnvVar, ResultSpec, Step, StepTemplate, Task, TaskSpec, WorkspaceDeclaration};
