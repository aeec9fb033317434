mod helpers;
mod publisher;
mod relay;
