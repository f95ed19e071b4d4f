//! Placeholder identifier discovery and classification.
//!
//! A placeholder is an identifier such as `_WM_COMMAND`: a leading
//! underscore and no lowercase letters. Every placeholder sighted in the
//! package must resolve to a declaration somewhere in the package; the ones
//! declared as `const` or `static` form the [`ResolutionSet`] handed to the
//! resolver program.

use proc_macro2::{TokenStream, TokenTree};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use syn::ext::IdentExt;
use syn::visit::Visit;
use syn::{Ident, Signature, Type};

use crate::error::{ConstGenError, Result};
use crate::scanner::Package;

/// Type names printed unsigned by the resolver program
const UNSIGNED_TYPES: &[&str] = &[
    "u8", "u16", "u32", "u64", "u128", "usize", "c_uchar", "c_ushort", "c_uint", "c_ulong",
    "c_ulonglong", "size_t", "BYTE", "WORD", "DWORD", "UINT", "ULONG", "WPARAM", "UINT_PTR",
    "ULONG_PTR", "DWORD_PTR", "SIZE_T",
];

/// What a declaration site introduces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Const,
    Static,
    Function,
    Type,
    Module,
    Field,
    Variant,
    AssocConst,
    Generic,
    Local,
    Macro,
}

impl DeclKind {
    /// Kinds a bare identifier pattern matches against instead of binding:
    /// constants, unit structs and unit variants
    pub fn matches_in_pattern(&self) -> bool {
        matches!(
            self,
            DeclKind::Const
                | DeclKind::Static
                | DeclKind::AssocConst
                | DeclKind::Type
                | DeclKind::Variant
        )
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclKind::Const => "const",
            DeclKind::Static => "static",
            DeclKind::Function => "fn",
            DeclKind::Type => "type",
            DeclKind::Module => "mod",
            DeclKind::Field => "field",
            DeclKind::Variant => "variant",
            DeclKind::AssocConst => "associated const",
            DeclKind::Generic => "generic parameter",
            DeclKind::Local => "local binding",
            DeclKind::Macro => "macro",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclKind,
    /// Declared type, when it is a plain path such as `u32` or `core::ffi::c_int`
    pub ty: Option<String>,
}

impl Declaration {
    pub fn new(kind: DeclKind) -> Self {
        Self { kind, ty: None }
    }

    pub fn typed(kind: DeclKind, ty: impl Into<String>) -> Self {
        Self {
            kind,
            ty: Some(ty.into()),
        }
    }
}

/// `_FOO`, `_WM_COMMAND`, `__X1`: a leading underscore, at least one more
/// character, and no lowercase letters.
pub fn is_placeholder_name(name: &str) -> bool {
    name.len() > 1 && name.starts_with('_') && !name.chars().any(|c| c.is_ascii_lowercase())
}

/// One placeholder occurrence in the syntax tree
#[derive(Debug, Clone, PartialEq)]
enum Sighting {
    Declared(String, Declaration),
    Used(String),
    /// Bare identifier pattern: a const pattern when the name is a constant,
    /// a new local binding otherwise
    Binding(String),
}

/// Placeholder declarations of the whole package; the first declaration of a
/// name is what its uses resolve to.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Declaration>,
}

impl SymbolTable {
    pub fn resolve(&self, name: &str) -> Option<&Declaration> {
        self.symbols.get(name)
    }

    fn declare(&mut self, name: &str, declaration: &Declaration) {
        self.symbols
            .entry(name.to_string())
            .or_insert_with(|| declaration.clone());
    }
}

/// Accumulates known and unknown placeholders while the tree is walked.
///
/// A name is either known (with the kind it was declared as) or unknown,
/// never both.
#[derive(Debug, Default)]
pub struct IdentifierClassifier {
    known: BTreeMap<String, Declaration>,
    unknown: BTreeSet<String>,
}

impl IdentifierClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sighting of `name`. `resolved` is the declaration the
    /// symbol table associates with this occurrence, if any.
    pub fn observe(&mut self, name: &str, resolved: Option<&Declaration>) -> Result<()> {
        let Some(declaration) = resolved else {
            if !self.known.contains_key(name) {
                self.unknown.insert(name.to_string());
            }
            return Ok(());
        };

        self.unknown.remove(name);
        match self.known.get(name) {
            Some(previous) if previous.kind != declaration.kind => {
                Err(ConstGenError::ClassificationConflict {
                    name: name.to_string(),
                    previous: previous.kind,
                    found: declaration.kind,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::debug!("{} is a {}", name, declaration.kind);
                self.known.insert(name.to_string(), declaration.clone());
                Ok(())
            }
        }
    }

    pub fn is_unknown(&self, name: &str) -> bool {
        self.unknown.contains(name)
    }

    /// Close the classification; any name still unknown is fatal.
    pub fn finish(self) -> Result<Classification> {
        if !self.unknown.is_empty() {
            return Err(ConstGenError::UnresolvedIdentifiers {
                names: self.unknown.into_iter().collect(),
            });
        }
        Ok(Classification { known: self.known })
    }
}

/// Final, immutable result of classifying a package
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    known: BTreeMap<String, Declaration>,
}

impl Classification {
    pub fn known(&self) -> &BTreeMap<String, Declaration> {
        &self.known
    }

    pub fn kind_of(&self, name: &str) -> Option<DeclKind> {
        self.known.get(name).map(|d| d.kind)
    }
}

/// Walk every file of `package` and classify each placeholder it mentions.
pub fn classify(package: &Package) -> Result<Classification> {
    let sightings: Vec<Sighting> = package
        .files
        .iter()
        .flat_map(|file| collect_sightings(&file.syntax))
        .collect();

    let mut table = SymbolTable::default();
    for sighting in &sightings {
        if let Sighting::Declared(name, declaration) = sighting {
            table.declare(name, declaration);
        }
    }
    // Bindings only introduce a local when no item of that name exists
    let local = Declaration::new(DeclKind::Local);
    for sighting in &sightings {
        if let Sighting::Binding(name) = sighting {
            table.declare(name, &local);
        }
    }

    let mut classifier = IdentifierClassifier::new();
    for sighting in &sightings {
        match sighting {
            Sighting::Declared(name, declaration) => classifier.observe(name, Some(declaration))?,
            Sighting::Used(name) => classifier.observe(name, table.resolve(name))?,
            Sighting::Binding(name) => match table.resolve(name) {
                Some(item) if item.kind.matches_in_pattern() => classifier.observe(name, Some(item))?,
                _ => classifier.observe(name, Some(&local))?,
            },
        }
    }

    let classification = classifier.finish()?;
    tracing::info!(
        "classified {} placeholder identifier(s) in package '{}'",
        classification.known.len(),
        package.name
    );
    Ok(classification)
}

fn collect_sightings(file: &syn::File) -> Vec<Sighting> {
    let mut walker = IdentWalker::default();
    walker.visit_file(file);
    walker.sightings
}

/// Reports declaration sites with their kind and every other identifier
/// token as a use.
#[derive(Default)]
struct IdentWalker {
    sightings: Vec<Sighting>,
}

impl IdentWalker {
    fn declare(&mut self, ident: &Ident, kind: DeclKind, ty: Option<&Type>) {
        let name = ident.unraw().to_string();
        if is_placeholder_name(&name) {
            let declaration = Declaration {
                kind,
                ty: ty.and_then(type_path),
            };
            self.sightings.push(Sighting::Declared(name, declaration));
        }
    }

    fn sight(&mut self, name: String) {
        if is_placeholder_name(&name) {
            self.sightings.push(Sighting::Used(name));
        }
    }

    fn visit_signature_body(&mut self, sig: &Signature) {
        self.visit_generics(&sig.generics);
        for input in &sig.inputs {
            self.visit_fn_arg(input);
        }
        self.visit_return_type(&sig.output);
    }

    fn visit_tokens(&mut self, tokens: &TokenStream) {
        for tree in tokens.clone() {
            match tree {
                TokenTree::Ident(ident) => self.sight(ident.unraw().to_string()),
                TokenTree::Group(group) => self.visit_tokens(&group.stream()),
                TokenTree::Punct(_) | TokenTree::Literal(_) => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for IdentWalker {
    fn visit_ident(&mut self, ident: &'ast Ident) {
        self.sight(ident.unraw().to_string());
    }

    fn visit_item_const(&mut self, i: &'ast syn::ItemConst) {
        self.declare(&i.ident, DeclKind::Const, Some(&*i.ty));
        self.visit_generics(&i.generics);
        self.visit_type(&i.ty);
        self.visit_expr(&i.expr);
    }

    fn visit_item_static(&mut self, i: &'ast syn::ItemStatic) {
        self.declare(&i.ident, DeclKind::Static, Some(&*i.ty));
        self.visit_type(&i.ty);
        self.visit_expr(&i.expr);
    }

    fn visit_item_fn(&mut self, i: &'ast syn::ItemFn) {
        self.declare(&i.sig.ident, DeclKind::Function, None);
        self.visit_signature_body(&i.sig);
        self.visit_block(&i.block);
    }

    fn visit_item_struct(&mut self, i: &'ast syn::ItemStruct) {
        self.declare(&i.ident, DeclKind::Type, None);
        self.visit_generics(&i.generics);
        self.visit_fields(&i.fields);
    }

    fn visit_item_union(&mut self, i: &'ast syn::ItemUnion) {
        self.declare(&i.ident, DeclKind::Type, None);
        self.visit_generics(&i.generics);
        self.visit_fields_named(&i.fields);
    }

    fn visit_item_enum(&mut self, i: &'ast syn::ItemEnum) {
        self.declare(&i.ident, DeclKind::Type, None);
        self.visit_generics(&i.generics);
        for variant in &i.variants {
            self.visit_variant(variant);
        }
    }

    fn visit_item_type(&mut self, i: &'ast syn::ItemType) {
        self.declare(&i.ident, DeclKind::Type, None);
        self.visit_generics(&i.generics);
        self.visit_type(&i.ty);
    }

    fn visit_item_trait(&mut self, i: &'ast syn::ItemTrait) {
        self.declare(&i.ident, DeclKind::Type, None);
        self.visit_generics(&i.generics);
        for bound in &i.supertraits {
            self.visit_type_param_bound(bound);
        }
        for item in &i.items {
            self.visit_trait_item(item);
        }
    }

    fn visit_item_mod(&mut self, i: &'ast syn::ItemMod) {
        self.declare(&i.ident, DeclKind::Module, None);
        if let Some((_, items)) = &i.content {
            for item in items {
                self.visit_item(item);
            }
        }
    }

    fn visit_item_macro(&mut self, i: &'ast syn::ItemMacro) {
        if let Some(ident) = &i.ident {
            self.declare(ident, DeclKind::Macro, None);
        }
        self.visit_macro(&i.mac);
    }

    fn visit_foreign_item_static(&mut self, i: &'ast syn::ForeignItemStatic) {
        self.declare(&i.ident, DeclKind::Static, Some(&*i.ty));
        self.visit_type(&i.ty);
    }

    fn visit_foreign_item_fn(&mut self, i: &'ast syn::ForeignItemFn) {
        self.declare(&i.sig.ident, DeclKind::Function, None);
        self.visit_signature_body(&i.sig);
    }

    fn visit_impl_item_const(&mut self, i: &'ast syn::ImplItemConst) {
        self.declare(&i.ident, DeclKind::AssocConst, Some(&i.ty));
        self.visit_type(&i.ty);
        self.visit_expr(&i.expr);
    }

    fn visit_impl_item_fn(&mut self, i: &'ast syn::ImplItemFn) {
        self.declare(&i.sig.ident, DeclKind::Function, None);
        self.visit_signature_body(&i.sig);
        self.visit_block(&i.block);
    }

    fn visit_impl_item_type(&mut self, i: &'ast syn::ImplItemType) {
        self.declare(&i.ident, DeclKind::Type, None);
        self.visit_type(&i.ty);
    }

    fn visit_trait_item_const(&mut self, i: &'ast syn::TraitItemConst) {
        self.declare(&i.ident, DeclKind::AssocConst, Some(&i.ty));
        self.visit_type(&i.ty);
        if let Some((_, expr)) = &i.default {
            self.visit_expr(expr);
        }
    }

    fn visit_trait_item_fn(&mut self, i: &'ast syn::TraitItemFn) {
        self.declare(&i.sig.ident, DeclKind::Function, None);
        self.visit_signature_body(&i.sig);
        if let Some(block) = &i.default {
            self.visit_block(block);
        }
    }

    fn visit_trait_item_type(&mut self, i: &'ast syn::TraitItemType) {
        self.declare(&i.ident, DeclKind::Type, None);
        for bound in &i.bounds {
            self.visit_type_param_bound(bound);
        }
        if let Some((_, ty)) = &i.default {
            self.visit_type(ty);
        }
    }

    fn visit_field(&mut self, f: &'ast syn::Field) {
        if let Some(ident) = &f.ident {
            self.declare(ident, DeclKind::Field, None);
        }
        self.visit_type(&f.ty);
    }

    fn visit_variant(&mut self, v: &'ast syn::Variant) {
        self.declare(&v.ident, DeclKind::Variant, None);
        self.visit_fields(&v.fields);
        if let Some((_, expr)) = &v.discriminant {
            self.visit_expr(expr);
        }
    }

    fn visit_type_param(&mut self, p: &'ast syn::TypeParam) {
        self.declare(&p.ident, DeclKind::Generic, None);
        for bound in &p.bounds {
            self.visit_type_param_bound(bound);
        }
        if let Some(default) = &p.default {
            self.visit_type(default);
        }
    }

    fn visit_const_param(&mut self, p: &'ast syn::ConstParam) {
        self.declare(&p.ident, DeclKind::Generic, None);
        self.visit_type(&p.ty);
        if let Some(default) = &p.default {
            self.visit_expr(default);
        }
    }

    fn visit_pat_ident(&mut self, p: &'ast syn::PatIdent) {
        if p.by_ref.is_none() && p.mutability.is_none() && p.subpat.is_none() {
            let name = p.ident.unraw().to_string();
            if is_placeholder_name(&name) {
                self.sightings.push(Sighting::Binding(name));
            }
            return;
        }
        self.declare(&p.ident, DeclKind::Local, None);
        if let Some((_, subpat)) = &p.subpat {
            self.visit_pat(subpat);
        }
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        self.visit_path(&mac.path);
        self.visit_tokens(&mac.tokens);
    }
}

fn type_path(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(p) if p.qself.is_none() => {
            let segments = p
                .path
                .segments
                .iter()
                .map(|s| s.arguments.is_empty().then(|| s.ident.to_string()))
                .collect::<Option<Vec<_>>>()?;
            let joined = segments.join("::");
            if p.path.leading_colon.is_some() {
                Some(format!("::{}", joined))
            } else {
                Some(joined)
            }
        }
        Type::Group(g) => type_path(&g.elem),
        Type::Paren(p) => type_path(&p.elem),
        _ => None,
    }
}

/// Declaration keyword emitted for a resolved placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKind {
    Const,
    Static,
}

impl ResolvedKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            ResolvedKind::Const => "const",
            ResolvedKind::Static => "static",
        }
    }
}

/// A placeholder whose native value the resolver program prints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolvable {
    pub name: String,
    pub kind: ResolvedKind,
    pub ty: String,
    pub signed: bool,
}

impl Resolvable {
    /// The native symbol, i.e. the name without its leading underscore
    pub fn native_name(&self) -> &str {
        &self.name[1..]
    }
}

/// Known `const` and `static` placeholders, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionSet {
    entries: Vec<Resolvable>,
}

impl ResolutionSet {
    pub fn from_classification(classification: &Classification) -> Result<Self> {
        let mut entries = Vec::new();
        for (name, declaration) in classification.known() {
            let kind = match declaration.kind {
                DeclKind::Const => ResolvedKind::Const,
                DeclKind::Static => ResolvedKind::Static,
                _ => continue,
            };
            let ty = declaration
                .ty
                .clone()
                .ok_or_else(|| ConstGenError::UnsupportedType { name: name.clone() })?;
            let last = ty.rsplit("::").next().unwrap_or(&ty);
            let signed = !UNSIGNED_TYPES.contains(&last);
            entries.push(Resolvable {
                name: name.clone(),
                kind,
                ty,
                signed,
            });
        }
        // BTreeMap iteration already yields ascending names
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resolvable> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
