mod buffer;
mod mqtt;
