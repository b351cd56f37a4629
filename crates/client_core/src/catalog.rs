use shared::domain::CatalogEntry;

/// Last catalog snapshot received from the server. Always replaced wholesale.
#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    entries: Vec<CatalogEntry>,
    total_templates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVisibility {
    pub name: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryVisibility {
    pub name: String,
    pub description: String,
    pub version: String,
    pub template_count: usize,
    pub visible: bool,
    pub templates: Vec<TemplateVisibility>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogView {
    pub categories: Vec<CategoryVisibility>,
}

impl CatalogView {
    pub fn visible_categories(&self) -> impl Iterator<Item = &CategoryVisibility> {
        self.categories.iter().filter(|category| category.visible)
    }
}

impl CatalogCache {
    pub fn replace(&mut self, mut entries: Vec<CatalogEntry>) {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.total_templates = entries.iter().map(|entry| entry.template_count).sum();
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_templates = 0;
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn total_categories(&self) -> usize {
        self.entries.len()
    }

    pub fn total_templates(&self) -> usize {
        self.total_templates
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive substring filter. A category is visible when its own
    /// name or any of its template names matches; each template is flagged on
    /// its own name only.
    pub fn filter(&self, term: &str) -> CatalogView {
        let needle = term.trim().to_lowercase();
        let matches =
            |candidate: &str| needle.is_empty() || candidate.to_lowercase().contains(&needle);

        let categories = self
            .entries
            .iter()
            .map(|entry| {
                let templates: Vec<TemplateVisibility> = entry
                    .template_names
                    .iter()
                    .map(|name| TemplateVisibility {
                        name: name.clone(),
                        visible: matches(name),
                    })
                    .collect();
                let visible =
                    matches(&entry.name) || templates.iter().any(|template| template.visible);
                CategoryVisibility {
                    name: entry.name.clone(),
                    description: entry.description.clone(),
                    version: entry.version.clone(),
                    template_count: entry.template_count,
                    visible,
                    templates,
                }
            })
            .collect();

        CatalogView { categories }
    }
}
