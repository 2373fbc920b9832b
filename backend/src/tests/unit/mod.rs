mod lifecycle;
mod scheduling;
