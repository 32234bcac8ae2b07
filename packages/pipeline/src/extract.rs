//! Pure extraction of structured records from job-board HTML.
//!
//! Extraction never fails: each field is pulled independently so a broken
//! selector degrades to a missing field, not a lost record. The whole
//! function returns `None` only when the page lacks the job-listing
//! container, which means this is not a job detail page at all.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::types::ScrapedJob;

/// Upper bound on stored description text.
const MAX_DESCRIPTION_CHARS: usize = 3000;
/// Upper bound on extracted skills.
const MAX_SKILLS: usize = 15;

/// Extract a [`ScrapedJob`] from a job detail page.
///
/// Returns `None` when the `div[data-test="JobListing"]` anchor element is
/// missing. Every field failure is isolated: the rest of the record is
/// still produced.
pub fn extract_job(html: &str) -> Option<ScrapedJob> {
    let document = Html::parse_document(html);
    let anchor = Selector::parse(r#"div[data-test="JobListing"]"#).ok()?;
    let listing = document.select(&anchor).next()?;

    let mut job = ScrapedJob {
        company_name: first_text(listing, "span.text-sm.font-semibold.text-black"),
        position: first_text(listing, "h1.inline.text-xl.font-semibold.text-black"),
        hiring_status: first_text(listing, "div.flex.items-center.text-sm.font-medium.text-pop-green"),
        slogan: first_text(listing, "div.text-sm.font-light.text-neutral-500"),
        ..ScrapedJob::default()
    };

    // Salary, location and experience share one detail list, in that order.
    let details = item_texts(listing, "ul.block.text-md.text-black > li");
    job.salary = details.first().cloned();
    job.location = details.get(1).cloned();
    job.experience = details.get(2).cloned();

    job.description =
        joined_text(listing, "div.break-words").map(|text| clip(&text, MAX_DESCRIPTION_CHARS));

    if let Some(section) = heading_section(listing, "Skills") {
        job.skills = item_texts(section, "span.text-sm")
            .into_iter()
            .take(MAX_SKILLS)
            .collect();
    }

    if let Some(section) = heading_section(listing, "Company") {
        let all: Vec<String> = section
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        job.company_size = all
            .iter()
            .find(|t| {
                let lower = t.to_lowercase();
                lower.contains("employees") || lower.contains("people")
            })
            .map(|t| clip(t, 100));
        if !all.is_empty() {
            job.company_location = Some(clip(&all.join(" "), 200));
        }
    }

    job.remote_policy = contains_text(listing, "div.text-sm", "Remote");
    job.visa = contains_text(listing, "div", "Visa sponsorship")
        .or_else(|| contains_text(listing, "div", "sponsorship"));
    job.amount_raised = contains_text(listing, "div", "Total Raised").map(|t| clip(&t, 100));
    job.founder = contains_text(listing, "div", "Founder")
        .or_else(|| contains_text(listing, "div", "CEO"))
        .map(|t| clip(&t, 100));

    if let Some(section) = heading_section(listing, "Industries") {
        job.industries = item_texts(section, "span")
            .into_iter()
            .take(5)
            .collect();
    }

    Some(job)
}

/// Extract job detail links from a search listing page, resolved against
/// the page's own URL. Order-preserving, deduplicated.
pub fn extract_job_links(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.mr-2.text-brand-burgandy") else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let resolved = match &base {
            Some(base) => match base.join(href) {
                Ok(url) => url.to_string(),
                Err(_) => continue,
            },
            None => href.to_string(),
        };
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }
    links
}

fn first_text(scope: ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    scope.select(&selector).next().and_then(|el| {
        let text: String = el.text().collect::<String>().trim().to_string();
        (!text.is_empty()).then_some(text)
    })
}

fn joined_text(scope: ElementRef<'_>, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let element = scope.select(&selector).next()?;
    let parts: Vec<String> = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn item_texts(scope: ElementRef<'_>, selector: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    scope
        .select(&selector)
        .filter_map(|el| {
            let text = el.text().collect::<String>().trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

/// First element matching `selector` whose text contains `needle`.
fn contains_text(scope: ElementRef<'_>, selector: &str, needle: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    scope.select(&selector).find_map(|el| {
        let text = el.text().collect::<String>().trim().to_string();
        text.contains(needle).then_some(text)
    })
}

/// The parent element of an `h3` whose text equals `heading`. Sections on
/// the job page are `<div><h3>Skills</h3>...</div>` blocks with no stable
/// classes of their own.
fn heading_section<'a>(scope: ElementRef<'a>, heading: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse("h3").ok()?;
    for h3 in scope.select(&selector) {
        let text = h3.text().collect::<String>();
        if text.trim() == heading {
            if let Some(parent) = h3.parent().and_then(ElementRef::wrap) {
                return Some(parent);
            }
        }
    }
    None
}

fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .take_while(|(i, _)| *i < max)
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    text[..cut].to_string()
}
