/*
 * Kernel Utilities
 */

pub mod logger;
