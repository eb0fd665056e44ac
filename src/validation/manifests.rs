// Expected staging layouts, one entry per directory level in walk order:
// the staging root, `BepInEx/`, then `BepInEx/core/`.

/// Empty marker kept in every staging root; the installer writes it, the deployer strips it.
pub const PLACEHOLDER: &str = ".gitkeep";

pub const STABLE: &[&[&str]] = &[
    &[PLACEHOLDER, "changelog.txt", "winhttp.dll"],
    &[],
    &[
        "0Harmony.dll",
        "0Harmony.xml",
        "0Harmony20.dll",
        "BepInEx.Harmony.dll",
        "BepInEx.Harmony.xml",
        "BepInEx.Preloader.dll",
        "BepInEx.Preloader.xml",
        "BepInEx.dll",
        "BepInEx.xml",
        "HarmonyXInterop.dll",
        "Mono.Cecil.Mdb.dll",
        "Mono.Cecil.Pdb.dll",
        "Mono.Cecil.Rocks.dll",
        "Mono.Cecil.dll",
        "MonoMod.RuntimeDetour.dll",
        "MonoMod.RuntimeDetour.xml",
        "MonoMod.Utils.dll",
        "MonoMod.Utils.xml",
    ],
];

pub const DEVELOPMENT: &[&[&str]] = &[
    &[PLACEHOLDER, "changelog.txt", "winhttp.dll"],
    &[],
    &[
        "0Harmony.dll",
        "BepInEx.Core.dll",
        "BepInEx.Core.xml",
        "BepInEx.Preloader.Core.dll",
        "BepInEx.Preloader.Core.xml",
        "BepInEx.Preloader.Unity.dll",
        "BepInEx.Preloader.Unity.xml",
        "BepInEx.Unity.dll",
        "BepInEx.Unity.xml",
        "Mono.Cecil.Mdb.dll",
        "Mono.Cecil.Pdb.dll",
        "Mono.Cecil.Rocks.dll",
        "Mono.Cecil.dll",
        "MonoMod.RuntimeDetour.dll",
        "MonoMod.Utils.dll",
        "SemanticVersioning.dll",
    ],
];
