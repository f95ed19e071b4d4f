//! Synthesizes the C program that prints native constant values.

use crate::classifier::{Resolvable, ResolutionSet};

/// Source file name of the resolver inside the scratch directory
pub const RESOLVER_SOURCE: &str = "resolve.c";

/// Ephemeral C source of the resolver program. Never written anywhere but the
/// scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverProgram {
    source: String,
    statements: usize,
}

impl ResolverProgram {
    /// One `printf` per entry, in `set` order, after including `headers`.
    pub fn build(set: &ResolutionSet, headers: &[String]) -> Self {
        let mut source = String::from("#include <stdint.h>\n#include <stdio.h>\n");
        for header in headers {
            source.push_str(&format!("#include <{}>\n", header));
        }
        source.push_str("\nint main(void)\n{\n");
        for entry in set.iter() {
            source.push_str(&print_statement(entry));
        }
        source.push_str("\treturn 0;\n}\n");

        tracing::debug!("resolver program has {} print statement(s)", set.len());
        Self {
            source,
            statements: set.len(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of constants the program prints
    pub fn statements(&self) -> usize {
        self.statements
    }
}

/// C type with the width of a declared Rust type, matched on its last path
/// segment. `None` for aliases the resolver does not know.
fn native_type(ty: &str) -> Option<&'static str> {
    let last = ty.rsplit("::").next().unwrap_or(ty);
    let native = match last {
        "i8" => "int8_t",
        "i16" => "int16_t",
        "i32" => "int32_t",
        "i64" => "int64_t",
        "isize" => "intptr_t",
        "u8" => "uint8_t",
        "u16" => "uint16_t",
        "u32" => "uint32_t",
        "u64" => "uint64_t",
        "usize" => "uintptr_t",
        "c_char" => "char",
        "c_schar" => "signed char",
        "c_uchar" => "unsigned char",
        "c_short" => "short",
        "c_ushort" => "unsigned short",
        "c_int" => "int",
        "c_uint" => "unsigned int",
        "c_long" => "long",
        "c_ulong" => "unsigned long",
        "c_longlong" => "long long",
        "c_ulonglong" => "unsigned long long",
        _ => return None,
    };
    Some(native)
}

/// `printf("pub const _FOO: u32 = %llu;\n", (unsigned long long) (uint32_t) (FOO));`
///
/// The value is first narrowed to the declared width so that, for example,
/// `0x80000000L` declared `i32` prints as `-2147483648`.
fn print_statement(entry: &Resolvable) -> String {
    let (format, widen) = if entry.signed {
        ("%lld", "long long")
    } else {
        ("%llu", "unsigned long long")
    };
    let cast = match native_type(&entry.ty) {
        Some(native) => format!("({}) ({})", widen, native),
        None => format!("({})", widen),
    };
    format!(
        "\tprintf(\"pub {} {}: {} = {};\\n\", {} ({}));\n",
        entry.kind.keyword(),
        entry.name,
        entry.ty,
        format,
        cast,
        entry.native_name()
    )
}
