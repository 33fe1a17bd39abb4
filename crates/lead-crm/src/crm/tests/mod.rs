mod common;
mod routing;
mod trash;
