//! Shader library: loads permutation shader files and generates their
//! permuted sources.
//!
//! A shader file has this shape:
//!
//! ```text
//! import <shadow_sampling.shader>
//! // leading comments are fine
//!
//! [PERMUTATIONS]
//! SHADOWS
//! MSAA_SAMPLES = *
//! TONEMAP = ACES
//!
//! [ALL_SHADERS]
//! #include <common.hlsl>
//!
//! [VERTEX_SHADER]
//! ...
//! #[if SHADOWS]
//! ...
//! #[endif]
//!
//! [PIXEL_SHADER]
//! ...
//! ```
//!
//! Loading resolves imports (recursively, through the same library),
//! expands `#include`s per section, discovers which permutation variables
//! each section references, and validates that every used variable is
//! declared in `[PERMUTATIONS]`. Loaded shaders are memoized by normalized
//! path and shared as `Arc`s.
//!
//! None of this is mandatory to use the selection engine; an application
//! with its own file format can drive
//! [`PermutationManager`](crate::select::PermutationManager) directly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::logger::Logger;
use crate::select::{PermutationManager, VariableKind, VariableSelection, VariableSet};
use crate::shader::file_cache::FileCache;
use crate::shader::file_locator::FileLocator;
use crate::shader::include::replace_includes;
use crate::shader::{PermutationShader, ShaderStage};
use crate::text::sectionizer::TextSectionizer;
use crate::text::scan::{accept_str, next_line, skip_whitespace, trim_trailing_whitespace};
use crate::text::tokenizer::{TokenKind, Tokenizer};
use crate::text::ValueTable;

/// Shader loading or usage failed; details are reported through the logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderLibraryError {
    /// A leading `import` statement could not be resolved.
    ImportNotFound,
    /// An imported shader failed to load.
    ImportFailed,
    /// The text before the first section holds something other than
    /// imports and comments.
    InvalidImports,
    /// The `[PERMUTATIONS]` section is malformed.
    MalformedPermutations,
    /// A `#[if]`/`#[elif]` condition could not be parsed.
    InvalidCondition,
    /// A used variable is not declared in `[PERMUTATIONS]`.
    UndeclaredVariable,
    /// A declared variable is not registered with the manager.
    UnknownVariable,
}

impl std::fmt::Display for ShaderLibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            ShaderLibraryError::ImportNotFound => "import could not be resolved",
            ShaderLibraryError::ImportFailed => "imported shader failed to load",
            ShaderLibraryError::InvalidImports => "invalid statements before the first section",
            ShaderLibraryError::MalformedPermutations => "[PERMUTATIONS] section is malformed",
            ShaderLibraryError::InvalidCondition => "condition could not be parsed",
            ShaderLibraryError::UndeclaredVariable => "used variable is not declared",
            ShaderLibraryError::UnknownVariable => "declared variable is not registered",
        };
        f.write_str(message)
    }
}

/// Loads and caches permutation shader files.
pub struct ShaderLibrary {
    logger: Arc<dyn Logger>,
    cache: Arc<dyn FileCache>,
    locator: Arc<dyn FileLocator>,
    loaded: Mutex<HashMap<String, Arc<PermutationShader>>>,
}

impl ShaderLibrary {
    pub fn new(
        cache: Arc<dyn FileCache>,
        locator: Arc<dyn FileLocator>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            logger,
            cache,
            locator,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// A previously loaded shader, if any.
    pub fn loaded_shader(&self, path: &str) -> Option<Arc<PermutationShader>> {
        let resolved = self.resolve(path)?;
        let loaded = self.loaded.lock().expect("shader map lock poisoned");
        let shader = loaded.get(&resolved);
        if shader.is_none() {
            self.logger
                .info(&format!("shader '{resolved}' has not been loaded before"));
        }
        shader.cloned()
    }

    /// Loads a shader file (and its imports). Returns `None` on failure;
    /// the log has the details.
    pub fn load_shader(&self, path: &str) -> Option<Arc<PermutationShader>> {
        let resolved = self.resolve(path)?;

        {
            let loaded = self.loaded.lock().expect("shader map lock poisoned");
            if let Some(shader) = loaded.get(&resolved) {
                self.logger
                    .info(&format!("permutation shader '{resolved}' already loaded"));
                return Some(shader.clone());
            }
        }

        self.logger
            .info(&format!("loading permutation shader '{resolved}'"));

        let Some(content) = self.cache.content(&resolved) else {
            self.logger
                .error(&format!("could not read shader file '{resolved}'"));
            return None;
        };

        // A placeholder entry breaks import cycles: a recursive load of this
        // path sees the entry and returns instead of recursing forever.
        self.loaded
            .lock()
            .expect("shader map lock poisoned")
            .insert(resolved.clone(), Arc::new(PermutationShader::new(resolved.clone())));

        let mut shader = PermutationShader::new(resolved.clone());
        let parsed = self
            .parse_shader_file(&mut shader, &content)
            .and_then(|()| self.validate(&shader));

        match parsed {
            Ok(()) => {
                let shader = Arc::new(shader);
                self.loaded
                    .lock()
                    .expect("shader map lock poisoned")
                    .insert(resolved.clone(), shader.clone());
                self.logger
                    .info(&format!("successfully loaded permutation shader '{resolved}'"));
                Some(shader)
            }
            Err(error) => {
                self.loaded
                    .lock()
                    .expect("shader map lock poisoned")
                    .remove(&resolved);
                self.logger.error(&format!(
                    "loading permutation shader '{resolved}' failed: {error}"
                ));
                None
            }
        }
    }

    /// All permutation variables referenced by the shader's conditions,
    /// including those of imported shaders.
    ///
    /// Meant for validation and debugging; the set must be contained in the
    /// declared `[PERMUTATIONS]` of the shader.
    pub fn all_used_variables(&self, shader: &PermutationShader, out: &mut BTreeSet<String>) {
        let mut visited = BTreeSet::new();
        self.collect_used_variables(shader, &mut visited, out);
    }

    /// All files contributing to the shader: its own path, every
    /// `#include`d file, and all imports, recursively.
    pub fn all_referenced_files(&self, shader: &PermutationShader, out: &mut BTreeSet<String>) {
        if !out.insert(shader.path().to_string()) {
            return;
        }

        for file in shader.referenced_files() {
            out.insert(file.clone());
        }

        for import in shader.imports() {
            if let Some(imported) = self.loaded_shader(import) {
                self.all_referenced_files(&imported, out);
            }
        }
    }

    /// Generates the permuted source of one section, with the imports'
    /// sections concatenated in front.
    pub fn generate_code(
        &self,
        shader: &PermutationShader,
        stage: ShaderStage,
        variables: &ValueTable,
    ) -> Option<String> {
        let mut emitted = BTreeSet::new();
        self.generate_code_guarded(shader, stage, variables, &mut emitted)
    }

    /// The variable set a shader exposes for permutation selection: every
    /// declared variable without a pinned value.
    ///
    /// Build this once per shader and keep it with the shader.
    pub fn create_variable_set(
        &self,
        shader: &PermutationShader,
        manager: &PermutationManager,
    ) -> Option<VariableSet> {
        let mut set = VariableSet::new();

        for (name, value) in shader.declared_permutations() {
            if value.is_some() {
                // Pinned variables never participate in selection.
                continue;
            }
            match manager.variable(name) {
                Some(variable) => set.add(variable),
                None => {
                    self.logger.error(&format!(
                        "variable '{}' does not exist (shader '{}')",
                        name,
                        shader.path()
                    ));
                    return None;
                }
            }
        }

        Some(set)
    }

    /// Fills the value table needed to render the permutation a selection
    /// describes: the selection's values, `NAME::LABEL` constants for every
    /// declared enum, and the pinned `[PERMUTATIONS]` values.
    pub fn selection_values(
        &self,
        variables: &mut ValueTable,
        shader: &PermutationShader,
        manager: &PermutationManager,
        selection: &VariableSelection,
    ) -> Result<(), ShaderLibraryError> {
        variables.clear();

        selection.iterate(manager, |variable, value, _label| {
            variables.insert(variable.name().to_string(), value);
        });

        self.add_enum_constants(variables, shader, manager)?;
        self.add_pinned_values(variables, shader, manager)
    }

    fn resolve(&self, path: &str) -> Option<String> {
        let normalized = self.cache.normalize_path(path);
        let resolved = self
            .locator
            .find(self.cache.as_ref(), "", &normalized);
        if resolved.is_none() {
            // Not an error at this level; callers may probe for optional files.
            self.logger
                .info(&format!("shader file '{normalized}' does not exist"));
        }
        resolved
    }

    fn collect_used_variables(
        &self,
        shader: &PermutationShader,
        visited: &mut BTreeSet<String>,
        out: &mut BTreeSet<String>,
    ) {
        if !visited.insert(shader.path().to_string()) {
            return;
        }

        for import in shader.imports() {
            if let Some(imported) = self.loaded_shader(import) {
                self.collect_used_variables(&imported, visited, out);
            }
        }

        for variable in shader.used_variables() {
            out.insert(variable.clone());
        }
    }

    fn generate_code_guarded(
        &self,
        shader: &PermutationShader,
        stage: ShaderStage,
        variables: &ValueTable,
        emitted: &mut BTreeSet<String>,
    ) -> Option<String> {
        if !emitted.insert(shader.path().to_string()) {
            return Some(String::new());
        }

        let mut result = String::new();

        for import in shader.imports() {
            let imported = self.loaded_shader(import)?;
            match self.generate_code_guarded(&imported, stage, variables, emitted) {
                Some(code) => result.push_str(&code),
                None => {
                    self.logger.error(&format!(
                        "failed to generate text permutation for import '{}'",
                        imported.path()
                    ));
                    return None;
                }
            }
        }

        match shader
            .section(stage)
            .generate_permutation(variables, self.logger.as_ref())
        {
            Ok(code) => result.push_str(&code),
            Err(_) => {
                self.logger.error(&format!(
                    "failed to generate text permutation for '{}'",
                    shader.path()
                ));
                return None;
            }
        }

        Some(result)
    }

    fn parse_shader_file(
        &self,
        shader: &mut PermutationShader,
        content: &str,
    ) -> Result<(), ShaderLibraryError> {
        let mut sectionizer = TextSectionizer::new();
        sectionizer.add_section("");
        sectionizer.add_section("[PERMUTATIONS]");
        sectionizer.add_section("[ALL_SHADERS]");
        for stage in ShaderStage::ALL {
            sectionizer.add_section(stage.section_name());
        }
        sectionizer.process(content);

        self.parse_imports(shader, sectionizer.section_content(0))?;
        self.load_imports(shader)?;

        self.parse_permutations_section(
            &mut shader.declared_permutations,
            sectionizer.section_content(1),
        )?;

        let common = sectionizer.section_content(2);

        for stage in ShaderStage::ALL {
            let section_text = sectionizer.section_content(3 + stage.index());

            let full_text = if stage.is_user_section() {
                section_text.to_string()
            } else {
                // Pipeline stages share the [ALL_SHADERS] prelude.
                format!("{common}{section_text}")
            };

            let mut included = BTreeSet::new();
            let expanded = replace_includes(
                shader.path(),
                &full_text,
                &mut included,
                self.locator.as_ref(),
                self.cache.as_ref(),
                self.logger.as_ref(),
            );
            shader.referenced_files.extend(included);

            shader.sections[stage.index()].set_text(expanded);

            if shader.sections[stage.index()]
                .determine_used_variables(&mut shader.used_variables, self.logger.as_ref())
                .is_err()
            {
                self.logger.error(&format!(
                    "shader section '{}' has an erroneous permutation condition",
                    stage.section_name()
                ));
                return Err(ShaderLibraryError::InvalidCondition);
            }
        }

        Ok(())
    }

    fn parse_imports(
        &self,
        shader: &mut PermutationShader,
        imports: &str,
    ) -> Result<(), ShaderLibraryError> {
        let mut remaining = imports;

        while !remaining.is_empty() {
            let mut line = next_line(&mut remaining);
            skip_whitespace(&mut line);
            let line = trim_trailing_whitespace(line);

            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            let mut reference = line;
            if accept_str(&mut reference, "import") {
                skip_whitespace(&mut reference);
                match self
                    .locator
                    .find(self.cache.as_ref(), shader.path(), reference)
                {
                    Some(imported) => {
                        shader.imports.push(imported);
                        continue;
                    }
                    None => {
                        self.logger
                            .error(&format!("could not locate file to import: '{reference}'"));
                        return Err(ShaderLibraryError::ImportNotFound);
                    }
                }
            }

            self.logger.error(&format!(
                "shader file starts with invalid statements: '{line}'"
            ));
            return Err(ShaderLibraryError::InvalidImports);
        }

        Ok(())
    }

    fn load_imports(&self, shader: &PermutationShader) -> Result<(), ShaderLibraryError> {
        for import in shader.imports() {
            if self.load_shader(import).is_none() {
                self.logger.error(&format!("failed to import '{import}'"));
                return Err(ShaderLibraryError::ImportFailed);
            }
        }
        Ok(())
    }

    /// Parses `[PERMUTATIONS]` lines: `NAME`, `NAME = *`, `NAME = LITERAL`.
    fn parse_permutations_section(
        &self,
        declared: &mut BTreeMap<String, Option<String>>,
        text: &str,
    ) -> Result<(), ShaderLibraryError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum State {
            Idle,
            HasName,
            HasEqual,
            HasValue,
        }

        let logger = self.logger.as_ref();
        let tokens = Tokenizer::new(logger).tokenize(text);

        let mut state = State::Idle;
        let mut name = String::new();

        for token in &tokens {
            match token.kind {
                TokenKind::LineComment | TokenKind::BlockComment => continue,

                TokenKind::NewLine => {
                    if state == State::HasEqual {
                        logger.error(&format!(
                            "[PERMUTATIONS]: missing assignment value: '{name} = ?'"
                        ));
                        return Err(ShaderLibraryError::MalformedPermutations);
                    }
                    if state == State::HasName {
                        declared.insert(name.clone(), None);
                    }
                    state = State::Idle;
                    continue;
                }

                TokenKind::NonIdentifier => {
                    if token.text == "=" && state == State::HasName {
                        state = State::HasEqual;
                        continue;
                    }
                    // "NAME = *" keeps the variable free to permute.
                    if token.text == "*" && state == State::HasEqual {
                        declared.insert(name.clone(), None);
                        state = State::HasValue;
                        continue;
                    }
                }

                TokenKind::Identifier | TokenKind::Integer => {
                    if state == State::Idle && token.kind == TokenKind::Identifier {
                        name = token.text.to_string();
                        state = State::HasName;
                        continue;
                    }
                    if state == State::HasEqual {
                        declared.insert(name.clone(), Some(token.text.to_string()));
                        state = State::HasValue;
                        continue;
                    }
                }
            }

            logger.error(&format!(
                "[PERMUTATIONS]: malformed structure at token '{}'",
                token.text
            ));
            return Err(ShaderLibraryError::MalformedPermutations);
        }

        match state {
            State::Idle | State::HasValue => Ok(()),
            State::HasName => {
                // Final line without a newline still declares the variable.
                declared.insert(name, None);
                Ok(())
            }
            State::HasEqual => {
                logger.error("[PERMUTATIONS]: malformed structure at the end");
                Err(ShaderLibraryError::MalformedPermutations)
            }
        }
    }

    /// Every variable referenced by a condition (except `::`-qualified enum
    /// constants) must be declared in `[PERMUTATIONS]`.
    fn validate(&self, shader: &PermutationShader) -> Result<(), ShaderLibraryError> {
        let mut used = BTreeSet::new();
        self.all_used_variables(shader, &mut used);

        let mut result = Ok(());
        for variable in &used {
            if variable.contains("::") {
                continue;
            }
            if !shader.declared_permutations().contains_key(variable) {
                self.logger.error(&format!(
                    "shader uses permutation variable '{variable}' that is not declared in its [PERMUTATIONS] section"
                ));
                result = Err(ShaderLibraryError::UndeclaredVariable);
            }
        }

        result
    }

    /// Adds `NAME::LABEL` constants for every declared enum variable so
    /// conditions can compare against labels.
    fn add_enum_constants(
        &self,
        variables: &mut ValueTable,
        shader: &PermutationShader,
        manager: &PermutationManager,
    ) -> Result<(), ShaderLibraryError> {
        for name in shader.declared_permutations().keys() {
            let Some(variable) = manager.variable(name) else {
                self.logger
                    .error(&format!("permutation variable '{name}' does not exist"));
                return Err(ShaderLibraryError::UnknownVariable);
            };

            if variable.kind() != VariableKind::Enum {
                continue;
            }

            for (label, value) in variable.allowed_values() {
                variables.insert(format!("{}::{}", variable.name(), label), *value);
            }
        }

        Ok(())
    }

    /// Applies the pinned `NAME = LITERAL` declarations.
    fn add_pinned_values(
        &self,
        variables: &mut ValueTable,
        shader: &PermutationShader,
        manager: &PermutationManager,
    ) -> Result<(), ShaderLibraryError> {
        for (name, pinned) in shader.declared_permutations() {
            let Some(pinned) = pinned else {
                continue;
            };

            let Some(variable) = manager.variable(name) else {
                self.logger
                    .error(&format!("permutation variable '{name}' does not exist"));
                return Err(ShaderLibraryError::UnknownVariable);
            };

            match variable.kind() {
                VariableKind::Bool => {
                    variables.insert(name.clone(), (pinned == "true") as i32);
                }
                VariableKind::Int => {
                    variables.insert(name.clone(), pinned.parse().unwrap_or(0));
                }
                VariableKind::Enum => {
                    if let Some((_, value)) = variable
                        .allowed_values()
                        .iter()
                        .find(|(label, _)| label == pinned)
                    {
                        variables.insert(name.clone(), *value);
                    }
                }
            }
        }

        Ok(())
    }
}
