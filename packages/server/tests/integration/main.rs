
mod invalidation;
mod pipeline;
