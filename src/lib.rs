//! arabica is an early-stage Java virtual machine. It decodes `.class`
//! files into typed in-memory classes and executes a subset of the JVM
//! instruction set on a stack-based interpreter.

pub mod bytecode;
pub mod classfile;
pub mod classpath;
pub mod interpreter;
pub mod runtime;
