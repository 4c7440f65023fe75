mod pipeline;
mod task;
